// src/compose/mod.rs
//
// Appends one validated company to the consolidated workbook sheet, plus a
// JSON audit file with the raw text, sources and annotations behind the row.

pub mod formula;
pub mod sheet;

use chrono::Utc;
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::error::{ComposeError, DuplicateCompanyError};
use crate::load::CompanyIndex;
use crate::schema::{schema, unquote_cell, CompanyRecord, ExtractedValue, ExtractionStatus, FieldKey, Value, ValueKind};
use crate::validate::{cross_field_instances, Status, ValidationReport, DEFAULT_SUM_TOLERANCE};
use sheet::{layout, COMPANY_COL, STATUS_COL, YEAR_COL};

/// Sheet row of the first company; row 1 is the header.
const FIRST_ROW: usize = 2;

/// Result of a successful append.
#[derive(Debug, Clone)]
pub struct Composed {
    pub company: String,
    /// 1-based sheet row the company landed on.
    pub row: usize,
    pub status: Status,
    pub flagged: Vec<FieldKey>,
    pub rejected: Vec<FieldKey>,
    pub workbook: PathBuf,
    pub audit: PathBuf,
    /// Questionnaires the operator may now move to "collected".
    pub documents: Vec<PathBuf>,
}

/// A company row read back from the workbook.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub company: String,
    pub reporting_year: u16,
    pub values: BTreeMap<FieldKey, ExtractedValue>,
}

#[derive(Serialize)]
struct Audit<'a> {
    company: &'a str,
    reporting_year: u16,
    written_at: String,
    documents: &'a [PathBuf],
    values: &'a BTreeMap<FieldKey, ExtractedValue>,
    validation: &'a ValidationReport,
}

pub struct Workbook {
    path: PathBuf,
    audit_dir: PathBuf,
    sum_tolerance: f64,
    rows: Vec<csv::StringRecord>,
    companies: HashSet<String>,
}

impl Workbook {
    /// Open the workbook at `path`, or start an empty one if it does not
    /// exist yet. Audit files go to `audit/` next to it.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ComposeError> {
        let path = path.as_ref().to_path_buf();
        let audit_dir = path
            .parent()
            .map(|p| p.join("audit"))
            .unwrap_or_else(|| PathBuf::from("audit"));

        let mut book = Self {
            path,
            audit_dir,
            sum_tolerance: DEFAULT_SUM_TOLERANCE,
            rows: Vec::new(),
            companies: HashSet::new(),
        };

        let empty = match fs::metadata(&book.path) {
            Ok(m) => m.len() == 0,
            Err(_) => true,
        };
        if empty {
            debug!("starting a new workbook");
            return Ok(book);
        }

        let path = book.path.clone();
        let csv_err = |source| ComposeError::Csv {
            path: path.clone(),
            source,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&book.path)
            .map_err(csv_err)?;

        let header = rdr.headers().map_err(csv_err)?.clone();
        if !header.iter().eq(layout().header().iter().map(String::as_str)) {
            return Err(ComposeError::HeaderMismatch { path: path.clone() });
        }

        for record in rdr.records() {
            let record = record.map_err(csv_err)?;
            if let Some(company) = record.get(COMPANY_COL) {
                book.companies.insert(company.to_string());
            }
            book.rows.push(record);
        }
        debug!(rows = book.rows.len(), "opened workbook");
        Ok(book)
    }

    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = dir.into();
        self
    }

    /// Tolerance baked into the sum-to-total formulas.
    pub fn with_sum_tolerance(mut self, tolerance: f64) -> Self {
        self.sum_tolerance = tolerance;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn companies(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().filter_map(|r| r.get(COMPANY_COL))
    }

    /// Append `record` as a new row. Nothing is written when the company
    /// already has a row.
    #[instrument(level = "debug", skip(self, record, documents), fields(company = %record.company))]
    pub fn append(&mut self, record: &CompanyRecord, documents: &[PathBuf]) -> Result<Composed, ComposeError> {
        // 1) duplicate check before touching any file
        if self.companies.contains(&record.company) {
            return Err(DuplicateCompanyError {
                company: record.company.clone(),
                location: self.path.clone(),
            }
            .into());
        }

        // 2) render the row
        let row = FIRST_ROW + self.rows.len();
        let cells = self.render(record, row);

        // 3) stage the audit trail, write the sheet, then publish the audit
        let staged = self.stage_audit(record, documents)?;
        if let Err(e) = self.write_sheet(&cells) {
            let _ = fs::remove_file(&staged.tmp);
            return Err(e);
        }
        self.rows.push(csv::StringRecord::from(cells));
        self.companies.insert(record.company.clone());
        let audit = staged.publish()?;

        let report = &record.validation;
        let composed = Composed {
            company: record.company.clone(),
            row,
            status: report.overall,
            flagged: report.fields_with(Status::Flagged).into_iter().cloned().collect(),
            rejected: report.fields_with(Status::Rejected).into_iter().cloned().collect(),
            workbook: self.path.clone(),
            audit,
            documents: documents.to_vec(),
        };

        match composed.status {
            Status::Accepted => info!(company = %composed.company, row, "row appended"),
            status => warn!(
                company = %composed.company,
                row,
                %status,
                flagged = composed.flagged.len(),
                rejected = composed.rejected.len(),
                "row appended with findings"
            ),
        }
        Ok(composed)
    }

    fn render(&self, record: &CompanyRecord, row: usize) -> Vec<String> {
        let l = layout();
        let mut cells = vec![String::new(); l.width()];
        cells[COMPANY_COL] = record.company.clone();
        cells[STATUS_COL] = formula::overall_status(row);
        cells[YEAR_COL] = record.reporting_year.to_string();

        for key in schema().fields() {
            let (Some(v), Some(s)) = (l.value_col(key), l.status_col(key)) else {
                continue;
            };
            cells[v] = record
                .get(key)
                .and_then(|e| e.value.as_ref())
                .map(Value::to_sheet_cell)
                .unwrap_or_default();
            cells[s] = formula::field_status(key, row);
        }

        for (i, inst) in cross_field_instances().iter().enumerate() {
            cells[l.rule_col(i)] = formula::cross_status(inst, self.sum_tolerance, row);
        }
        cells
    }

    /// Write the audit file next to its final name. Refuses to stand in for
    /// an audit that belongs to another company.
    fn stage_audit(&self, record: &CompanyRecord, documents: &[PathBuf]) -> Result<StagedAudit, ComposeError> {
        fs::create_dir_all(&self.audit_dir).map_err(io_err(&self.audit_dir))?;
        let name = file_stem(&record.company);
        let path = self.audit_dir.join(format!("{}.json", name));
        let tmp_path = self.audit_dir.join(format!(".{}.json.tmp", name));

        if let Some(owner) = audit_owner(&path)? {
            if owner != record.company {
                return Err(ComposeError::AuditCollision {
                    path,
                    company: record.company.clone(),
                    owner,
                });
            }
        }

        let audit = Audit {
            company: &record.company,
            reporting_year: record.reporting_year,
            written_at: Utc::now().to_rfc3339(),
            documents,
            values: &record.values,
            validation: &record.validation,
        };

        let mut tmp = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        serde_json::to_writer_pretty(&mut tmp, &audit)?;
        tmp.write_all(b"\n").map_err(io_err(&tmp_path))?;

        Ok(StagedAudit { tmp: tmp_path, path })
    }

    /// Rewrite the whole sheet with `new_row` appended: to a temp file next
    /// to the workbook, then rename over it.
    fn write_sheet(&self, new_row: &[String]) -> Result<(), ComposeError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| ComposeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook.csv".to_string());
        let tmp_path = dir.join(format!(".{}.tmp", file_name));

        let csv_err = |source| ComposeError::Csv {
            path: tmp_path.clone(),
            source,
        };
        let mut wtr = csv::Writer::from_path(&tmp_path).map_err(csv_err)?;
        wtr.write_record(layout().header()).map_err(csv_err)?;
        for row in &self.rows {
            wtr.write_record(row).map_err(csv_err)?;
        }
        wtr.write_record(new_row).map_err(csv_err)?;
        wtr.flush().map_err(|source| ComposeError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        drop(wtr);

        fs::rename(&tmp_path, &self.path).map_err(|source| ComposeError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Every company row, with values rebuilt from the value cells. Formula
    /// cells are ignored; statuses are re-derived by validating again.
    pub fn records(&self) -> Vec<StoredRow> {
        let l = layout();
        self.rows
            .iter()
            .filter_map(|r| {
                let company = r.get(COMPANY_COL)?.to_string();
                let reporting_year = match r.get(YEAR_COL).map(|s| s.trim().parse::<u16>()) {
                    Some(Ok(y)) => y,
                    _ => {
                        warn!(%company, "workbook row without a reporting year, skipped");
                        return None;
                    }
                };
                let values = schema()
                    .fields()
                    .iter()
                    .map(|key| {
                        let cell = l.value_col(key).and_then(|c| r.get(c)).unwrap_or("");
                        (key.clone(), from_cell(key, cell))
                    })
                    .collect();
                Some(StoredRow {
                    company,
                    reporting_year,
                    values,
                })
            })
            .collect()
    }
}

impl CompanyIndex for Workbook {
    fn contains(&self, company: &str) -> bool {
        self.companies.contains(company)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Rebuild a value from its cell text, the inverse of `Value::to_sheet_cell`.
fn from_cell(key: &FieldKey, cell: &str) -> ExtractedValue {
    let (text, quoted) = unquote_cell(cell.trim());
    if text.is_empty() && !quoted {
        return ExtractedValue::not_found(key.clone());
    }

    let kind = schema().metric_of(key).map(|m| m.kind).unwrap_or(ValueKind::Text);
    let (value, status) = match kind {
        ValueKind::Number if quoted => (Value::Text(text.to_string()), ExtractionStatus::Uncontrolled),
        ValueKind::Number => match text.parse::<f64>() {
            Ok(n) => (Value::Number(n), ExtractionStatus::Found),
            Err(_) => (Value::Text(text.to_string()), ExtractionStatus::Uncontrolled),
        },
        ValueKind::Category => (Value::Category(text.to_string()), ExtractionStatus::Found),
        ValueKind::Text => (Value::Text(text.to_string()), ExtractionStatus::Found),
        ValueKind::Flag => match text {
            "yes" => (Value::Flag(true), ExtractionStatus::Found),
            "no" => (Value::Flag(false), ExtractionStatus::Found),
            other => (Value::Text(other.to_string()), ExtractionStatus::Uncontrolled),
        },
    };

    ExtractedValue {
        field: key.clone(),
        value: Some(value),
        raw: Some(cell.to_string()),
        source: None,
        status,
    }
}

/// An audit file written under its temp name, not yet visible.
struct StagedAudit {
    tmp: PathBuf,
    path: PathBuf,
}

impl StagedAudit {
    fn publish(self) -> Result<PathBuf, ComposeError> {
        fs::rename(&self.tmp, &self.path).map_err(io_err(&self.path))?;
        debug!(path = %self.path.display(), "wrote audit file");
        Ok(self.path)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ComposeError {
    let path = path.to_path_buf();
    move |source| ComposeError::Io { path, source }
}

/// Company recorded in an existing audit file, if there is one.
fn audit_owner(path: &Path) -> Result<Option<String>, ComposeError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    let audit: serde_json::Value = serde_json::from_str(&text)?;
    Ok(audit.get("company").and_then(|c| c.as_str()).map(str::to_string))
}

/// Company name made safe for a file name. Reserved characters, control
/// characters and `%` itself are percent-encoded, so distinct names never
/// share a file.
fn file_stem(company: &str) -> String {
    let mut stem = String::with_capacity(company.len());
    for c in company.chars() {
        match c {
            '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => stem.push_str(&format!("%{:02X}", c as u32)),
            c if c.is_control() => stem.push_str(&format!("%{:02X}", c as u32)),
            c => stem.push(c),
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::schema::fields::*;
    use crate::validate::Validator;
    use tempfile::tempdir;

    #[test]
    fn appends_rows_and_reads_them_back() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("out").join("workbook.csv");

        let acme = fixtures::record(dir.path(), "Acme Corp");
        let globex = fixtures::record(dir.path(), "Globex");

        let mut book = Workbook::open(&book_path).unwrap();
        assert!(book.is_empty());

        let first = book.append(&acme, &[]).unwrap();
        assert_eq!(first.row, 2);
        assert_eq!(first.status, acme.validation.overall);
        assert!(first.audit.ends_with("audit/Acme Corp.json"));

        // reopen from disk
        let mut book = Workbook::open(&book_path).unwrap();
        assert!(CompanyIndex::contains(&book, "Acme Corp"));
        assert!(!CompanyIndex::contains(&book, "acme corp"));
        let second = book.append(&globex, &[]).unwrap();
        assert_eq!(second.row, 3);

        let rows = Workbook::open(&book_path).unwrap().records();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company, "Acme Corp");
        assert_eq!(rows[0].reporting_year, 2019);
        assert_eq!(rows[0].values.len(), schema().fields().len());
        assert_eq!(rows[0].values[&FieldKey::yearly(S1, 2018)].number(), Some(1000.0));
        assert_eq!(
            rows[0].values[&FieldKey::scalar(METHODOLOGY)].value,
            acme.values[&FieldKey::scalar(METHODOLOGY)].value
        );
    }

    #[test]
    fn reread_rows_validate_like_the_original() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("workbook.csv");
        let acme = fixtures::record(dir.path(), "Acme Corp");

        let mut book = Workbook::open(&book_path).unwrap();
        book.append(&acme, &[]).unwrap();

        let row = &book.records()[0];
        let again = Validator::default().validate(&row.values, row.reporting_year);
        assert_eq!(again.overall, acme.validation.overall);
        assert_eq!(again.violations.len(), acme.validation.violations.len());
    }

    #[test]
    fn duplicate_company_writes_nothing() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("workbook.csv");
        let acme = fixtures::record(dir.path(), "Acme Corp");

        let mut book = Workbook::open(&book_path).unwrap();
        book.append(&acme, &[]).unwrap();
        let before = fs::read(&book_path).unwrap();
        let audit = book.audit_dir().join("Acme Corp.json");
        let audit_before = fs::read(&audit).unwrap();

        let err = book.append(&acme, &[]).unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateCompany(ref d) if d.company == "Acme Corp"));
        assert_eq!(fs::read(&book_path).unwrap(), before);
        assert_eq!(fs::read(&audit).unwrap(), audit_before);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn foreign_header_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("workbook.csv");
        fs::write(&path, "company,something else\nAcme,1\n").unwrap();
        assert!(matches!(Workbook::open(&path), Err(ComposeError::HeaderMismatch { .. })));
    }

    #[test]
    fn row_carries_formulas() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("workbook.csv");
        let acme = fixtures::record(dir.path(), "Acme Corp");
        let mut book = Workbook::open(&book_path).unwrap();
        book.append(&acme, &[]).unwrap();

        let mut rdr = csv::Reader::from_path(&book_path).unwrap();
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(row.len(), layout().width());
        assert!(row[STATUS_COL].starts_with("=IF(COUNTIF("));
        let s1 = layout().status_col(&FieldKey::yearly(S1, 2019)).unwrap();
        assert!(row[s1].starts_with("=IF("));
        assert!(row[layout().rule_col(0)].starts_with("=IF("));
    }

    #[test]
    fn audit_keeps_raw_text_and_sources() {
        let dir = tempdir().unwrap();
        let acme = fixtures::record(dir.path(), "Acme Corp");
        let mut book = Workbook::open(dir.path().join("workbook.csv")).unwrap();
        let composed = book.append(&acme, &[PathBuf::from("a.html")]).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&composed.audit).unwrap()).unwrap();
        assert_eq!(json["company"], "Acme Corp");
        assert_eq!(json["documents"][0], "a.html");
        let s1 = &json["values"]["S1 2018"];
        assert!(s1["raw"].as_str().unwrap().contains("1000"));
        assert!(s1["source"]["question"].is_string());
        assert_eq!(json["validation"]["overall"], acme.validation.overall.as_str());
    }

    #[test]
    fn unsafe_characters_leave_file_names() {
        assert_eq!(file_stem("AT&T / Inc."), "AT&T %2F Inc.");
        assert_eq!(file_stem("100% Green"), "100%25 Green");
        assert_ne!(file_stem("A/B Corp"), file_stem("A_B Corp"));
        assert_ne!(file_stem("A/B Corp"), file_stem("A%2FB Corp"));
    }

    #[test]
    fn similar_names_keep_separate_audits() {
        let dir = tempdir().unwrap();
        let mut book = Workbook::open(dir.path().join("workbook.csv")).unwrap();
        let slash = book.append(&fixtures::record(dir.path(), "A/B Corp"), &[]).unwrap();
        let underscore = book.append(&fixtures::record(dir.path(), "A_B Corp"), &[]).unwrap();
        assert_ne!(slash.audit, underscore.audit);

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&slash.audit).unwrap()).unwrap();
        assert_eq!(json["company"], "A/B Corp");
    }

    #[test]
    fn audit_of_another_company_is_not_replaced() {
        let dir = tempdir().unwrap();
        let acme = fixtures::record(dir.path(), "Acme Corp");
        let mut book = Workbook::open(dir.path().join("workbook.csv")).unwrap();

        // what a case-insensitive filesystem would show for "Acme Corp"
        fs::create_dir_all(book.audit_dir()).unwrap();
        let audit = book.audit_dir().join("Acme Corp.json");
        fs::write(&audit, r#"{"company":"ACME CORP"}"#).unwrap();

        let err = book.append(&acme, &[]).unwrap_err();
        assert!(matches!(err, ComposeError::AuditCollision { ref owner, .. } if owner == "ACME CORP"));
        assert_eq!(fs::read_to_string(&audit).unwrap(), r#"{"company":"ACME CORP"}"#);
        assert!(book.is_empty());
        assert!(!book.path().exists());
    }

    #[test]
    fn failed_sheet_write_leaves_no_audit() {
        let dir = tempdir().unwrap();
        let acme = fixtures::record(dir.path(), "Acme Corp");
        let mut book = Workbook::open(dir.path().join("workbook.csv")).unwrap();
        // the sheet's temp file cannot be created over a directory
        fs::create_dir_all(dir.path().join(".workbook.csv.tmp")).unwrap();

        assert!(book.append(&acme, &[]).is_err());
        assert!(book.is_empty());
        let left: Vec<_> = fs::read_dir(book.audit_dir()).unwrap().collect();
        assert!(left.is_empty(), "audit dir not empty: {:?}", left);
    }

    #[test]
    fn formula_like_text_is_quoted_and_read_back() {
        let dir = tempdir().unwrap();
        let book_path = dir.path().join("workbook.csv");
        let mut acme = fixtures::record(dir.path(), "Acme Corp");
        let s1 = FieldKey::yearly(S1, 2018);
        let method = FieldKey::scalar(METHODOLOGY);
        let start = FieldKey::scalar(REPORTING_START);
        let set = |acme: &mut CompanyRecord, key: &FieldKey, value: Value| {
            let v = acme.values.get_mut(key).unwrap();
            v.value = Some(value);
            v.status = ExtractionStatus::Uncontrolled;
        };
        set(&mut acme, &s1, Value::Text("- see attached report".into()));
        set(&mut acme, &method, Value::Category("=HYPERLINK(\"x\")".into()));
        set(&mut acme, &start, Value::Text("'quoted".into()));

        let mut book = Workbook::open(&book_path).unwrap();
        book.append(&acme, &[]).unwrap();

        let mut rdr = csv::Reader::from_path(&book_path).unwrap();
        let row = rdr.records().next().unwrap().unwrap();
        let cell = |key: &FieldKey| row[layout().value_col(key).unwrap()].to_string();
        assert_eq!(cell(&s1), "'- see attached report");
        assert_eq!(cell(&method), "'=HYPERLINK(\"x\")");
        assert_eq!(cell(&start), "''quoted");
        for key in schema().fields() {
            if let Some(c) = layout().value_col(key) {
                assert!(!row[c].starts_with('='), "{key} opens as a formula");
            }
        }

        let stored = &book.records()[0];
        assert_eq!(stored.values[&s1].value, Some(Value::Text("- see attached report".into())));
        assert_eq!(stored.values[&s1].status, ExtractionStatus::Uncontrolled);
        assert_eq!(stored.values[&method].value, Some(Value::Category("=HYPERLINK(\"x\")".into())));
        assert_eq!(stored.values[&start].value, Some(Value::Text("'quoted".into())));

        let again = Validator::default().validate(&stored.values, stored.reporting_year);
        assert!(again.fields_with(Status::Rejected).contains(&&s1));
    }
}
