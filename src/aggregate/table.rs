// src/aggregate/table.rs
//
// A small in-memory string table: the shape every reference input and every
// aggregated output shares.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    io::Read,
    path::Path,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    header: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let header: Vec<String> = header.into_iter().map(Into::into).collect();
        let index = header
            .iter()
            .enumerate()
            .map(|(i, h)| (normalise(h), i))
            .collect();
        Self {
            header,
            index,
            rows: Vec::new(),
        }
    }

    /// Parse CSV with a header row. Short rows are padded with empty cells.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Table::new(rdr.headers().context("reading CSV header")?.iter());
        for (i, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("reading CSV row {}", i + 2))?;
            table.push(record.iter());
        }
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.header.len(), String::new());
        self.rows.push(row);
    }

    /// Column index by name, ignoring case and surrounding blanks.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.index.get(&normalise(name)).copied()
    }

    /// Cell text of `row` under column `name`; `None` when the column does
    /// not exist or the cell is blank.
    pub fn get<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        self.column(name)
            .and_then(|c| row.get(c))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Write as CSV: to `.name.tmp` next to `path`, then rename over it.
    pub fn write(&self, path: &Path) -> Result<()> {
        // 1) make sure the directory exists
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

        // 2) write the temp file
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table.csv".to_string());
        let tmp_path = dir.join(format!(".{}.tmp", name));
        {
            let mut wtr = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            wtr.write_record(&self.header)?;
            for row in &self.rows {
                wtr.write_record(row)?;
            }
            wtr.flush()?;
        }

        // 3) rename over the original
        fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
        Ok(())
    }
}

fn normalise(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lookups_ignore_case_and_padding() {
        let t = Table::from_reader("Name, Rank ,Country\nAcme Corp,1\n".as_bytes()).unwrap();
        assert_eq!(t.len(), 1);
        let row = &t.rows()[0];
        assert_eq!(t.get(row, "name"), Some("Acme Corp"));
        assert_eq!(t.get(row, "RANK"), Some("1"));
        assert_eq!(t.get(row, "country"), None);
        assert_eq!(t.get(row, "revenue"), None);
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db").join("t.csv");
        let mut t = Table::new(["company", "note"]);
        t.push(["Acme, Inc.", "a \"quoted\" note"]);
        t.push(["Globex"]);
        t.write(&path).unwrap();

        let back = Table::from_path(&path).unwrap();
        assert_eq!(back, t);
        assert!(!dir.path().join("db").join(".t.csv.tmp").exists());
    }
}
