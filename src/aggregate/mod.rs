// src/aggregate/mod.rs
//
// Joins the validated workbook rows with the reference tables into flat
// per-topic CSV databases plus one view per initiative.

pub mod initiative;
pub mod provider;
pub mod reference;
pub mod table;

pub use initiative::{views, Figures, InitiativeView};
pub use provider::{provider_for, CsvFile, HttpCsv, TableProvider};
pub use reference::{CompanyInfo, Initiative, Membership, References};
pub use table::Table;

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::compose::StoredRow;
use crate::schema::fields::UTILITY;
use crate::schema::{schema, ExtractedValue, FieldKey, Group, Value, DATA_YEARS};
use crate::validate::{Status, Validator};

/// Which series metrics each per-year table carries.
const YEARLY_TABLES: [(&str, &[Group]); 3] = [
    ("emissions", &[Group::Emissions]),
    ("energy", &[Group::Consumption, Group::Generation]),
    ("s2mb", &[Group::Sourcing]),
];

/// Columns computed from the emissions figures.
const DERIVED_EMISSIONS: [&str; 3] = ["S2", "S1+2", "S1+2+3"];

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InitiativeCoverage {
    pub members: usize,
    pub members_with_records: usize,
}

/// How the validated rows and the reference list lined up.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CoverageSummary {
    pub companies: usize,
    pub matched: Vec<String>,
    pub only_in_records: Vec<String>,
    pub only_in_reference: Vec<String>,
    /// Rows skipped because they re-validated as rejected.
    pub rejected: Vec<String>,
    pub flagged: Vec<String>,
    pub initiatives: BTreeMap<Initiative, InitiativeCoverage>,
    /// Companies whose utility answers disagree with their reference industry.
    pub utility_mismatches: Vec<String>,
}

/// The aggregated tables, ready to be written.
#[derive(Debug, Clone)]
pub struct Database {
    pub central: Table,
    pub yearly: Vec<(&'static str, Table)>,
    pub initiatives: Vec<(Initiative, Table)>,
    pub coverage: CoverageSummary,
}

/// One company of the full outer join.
struct Joined<'a> {
    company: &'a str,
    info: Option<&'a CompanyInfo>,
    record: Option<(&'a StoredRow, Status)>,
}

pub struct Aggregator {
    validator: Validator,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Validator::default())
    }
}

impl Aggregator {
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }

    #[instrument(level = "info", skip_all, fields(rows = rows.len(), reference = refs.companies.len()))]
    pub fn aggregate(&self, rows: &[StoredRow], refs: &References) -> Database {
        let mut coverage = CoverageSummary::default();
        let empty = BTreeMap::new();

        // 1) re-validate; hand edits in the workbook are judged as they stand
        let mut records: BTreeMap<&str, (&StoredRow, Status)> = BTreeMap::new();
        for row in rows {
            let report = self.validator.validate(&row.values, row.reporting_year);
            match report.overall {
                Status::Rejected => {
                    warn!(company = %row.company, violations = report.violations.len(), "rejected row skipped");
                    coverage.rejected.push(row.company.clone());
                    continue;
                }
                Status::Flagged => coverage.flagged.push(row.company.clone()),
                Status::Accepted => {}
            }
            if records.insert(row.company.as_str(), (row, report.overall)).is_some() {
                warn!(company = %row.company, "company appears twice in the workbook, last row kept");
            }
        }

        // 2) full outer join on the company key
        let keys: BTreeSet<&str> = records
            .keys()
            .copied()
            .chain(refs.companies.keys().map(String::as_str))
            .collect();
        let joined: Vec<Joined> = keys
            .into_iter()
            .map(|company| Joined {
                company,
                info: refs.companies.get(company),
                record: records.get(company).copied(),
            })
            .collect();

        for j in &joined {
            match (j.info, j.record) {
                (Some(_), Some(_)) => coverage.matched.push(j.company.to_string()),
                (None, Some(_)) => coverage.only_in_records.push(j.company.to_string()),
                (Some(_), None) => coverage.only_in_reference.push(j.company.to_string()),
                (None, None) => {}
            }
            if let (Some(info), Some((row, _))) = (j.info, j.record) {
                if utility_mismatch(info, &row.values) {
                    warn!(company = %j.company, industry = ?info.industry, "utility answers disagree with the reference industry");
                    coverage.utility_mismatches.push(j.company.to_string());
                }
            }
        }
        coverage.companies = joined.len();
        for unmatched in &coverage.only_in_records {
            debug!(company = %unmatched, "no reference entry");
        }

        // 3) the tables
        let central = central_table(&joined, refs);
        let yearly = YEARLY_TABLES
            .iter()
            .map(|(name, groups)| (*name, yearly_table(&joined, refs, groups, *name == "emissions")))
            .collect();

        let mut initiatives = Vec::new();
        for view in views() {
            let members: Vec<&Membership> = refs
                .members(view.initiative)
                .filter(|m| view.includes(m))
                .collect();
            let with_records = members.iter().filter(|m| records.contains_key(m.company.as_str())).count();
            coverage.initiatives.insert(
                view.initiative,
                InitiativeCoverage {
                    members: members.len(),
                    members_with_records: with_records,
                },
            );

            let mut header = vec!["company".to_string(), "year".to_string()];
            header.extend(view.columns.iter().map(|c| c.to_string()));
            let mut table = Table::new(header);
            for m in members {
                let values = records.get(m.company.as_str()).map(|(r, _)| &r.values).unwrap_or(&empty);
                for year in DATA_YEARS {
                    let mut cells = vec![m.company.clone(), year.to_string()];
                    cells.extend(view.derive(m, values, year));
                    table.push(cells);
                }
            }
            initiatives.push((view.initiative, table));
        }

        info!(
            companies = coverage.companies,
            matched = coverage.matched.len(),
            only_in_records = coverage.only_in_records.len(),
            only_in_reference = coverage.only_in_reference.len(),
            rejected = coverage.rejected.len(),
            "aggregated"
        );

        Database {
            central,
            yearly,
            initiatives,
            coverage,
        }
    }
}

impl Database {
    /// Write every table plus `coverage.json` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut written = Vec::new();

        let tables = std::iter::once(("central", &self.central))
            .chain(self.yearly.iter().map(|(n, t)| (*n, t)))
            .chain(self.initiatives.iter().map(|(i, t)| (i.prefix(), t)));
        for (name, table) in tables {
            let path = dir.join(format!("{}.csv", name));
            table.write(&path)?;
            debug!(path = %path.display(), rows = table.len(), "wrote table");
            written.push(path);
        }

        let path = dir.join("coverage.json");
        let tmp_path = dir.join(".coverage.json.tmp");
        let mut tmp = fs::File::create(&tmp_path).with_context(|| format!("creating {}", tmp_path.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.coverage).context("serialising coverage summary")?;
        tmp.write_all(b"\n")?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
        written.push(path);

        Ok(written)
    }
}

/// Load the three reference tables.
pub fn load_references(
    companies: &dyn TableProvider,
    re100: &dyn TableProvider,
    sbti: &dyn TableProvider,
) -> Result<References> {
    let fetch = |p: &dyn TableProvider| p.fetch().with_context(|| format!("reference table {}", p.describe()));
    let refs = References::new(&fetch(companies)?, &fetch(re100)?, &fetch(sbti)?);
    info!(
        companies = refs.companies.len(),
        memberships = refs.memberships.len(),
        "loaded reference tables"
    );
    Ok(refs)
}

fn membership_header() -> Vec<String> {
    Initiative::ALL
        .iter()
        .flat_map(|i| Membership::COLUMNS.iter().map(move |c| format!("{} {}", i.prefix(), c)))
        .collect()
}

fn membership_cells(refs: &References, company: &str) -> Vec<String> {
    Initiative::ALL
        .iter()
        .flat_map(|&i| match refs.membership(i, company) {
            Some(m) => m.cells(),
            None => vec![String::new(); Membership::COLUMNS.len()],
        })
        .collect()
}

fn cell(values: &BTreeMap<FieldKey, ExtractedValue>, key: &FieldKey) -> String {
    values
        .get(key)
        .and_then(|v| v.value.as_ref())
        .map(Value::to_sheet_cell)
        .unwrap_or_default()
}

/// One row per company: reference metadata and every scalar field.
fn central_table(joined: &[Joined], refs: &References) -> Table {
    let scalars: Vec<&FieldKey> = schema().fields().iter().filter(|k| k.year.is_none()).collect();

    let mut header = vec!["company".to_string()];
    header.extend(CompanyInfo::COLUMNS.iter().map(|c| c.to_string()));
    header.extend(["reporting year".to_string(), "status".to_string()]);
    header.extend(scalars.iter().map(|k| k.to_string()));
    header.extend(membership_header());

    let mut table = Table::new(header);
    for j in joined {
        let mut cells = vec![j.company.to_string()];
        cells.extend(j.info.cloned().unwrap_or_default().cells());
        match j.record {
            Some((row, status)) => {
                cells.push(row.reporting_year.to_string());
                cells.push(status.to_string());
                cells.extend(scalars.iter().map(|k| cell(&row.values, k)));
            }
            None => cells.extend(std::iter::repeat(String::new()).take(2 + scalars.len())),
        }
        cells.extend(membership_cells(refs, j.company));
        table.push(cells);
    }
    table
}

/// One row per company and data year for the series metrics of `groups`.
fn yearly_table(joined: &[Joined], refs: &References, groups: &[Group], derived: bool) -> Table {
    let metrics: Vec<&str> = schema()
        .metrics()
        .iter()
        .filter(|m| m.series && groups.contains(&m.group))
        .map(|m| m.name.as_ref())
        .collect();

    let mut header = vec!["company".to_string(), "year".to_string()];
    header.extend(metrics.iter().map(|m| m.to_string()));
    if derived {
        header.extend(DERIVED_EMISSIONS.iter().map(|c| c.to_string()));
    }
    header.extend(membership_header());

    let empty = BTreeMap::new();
    let mut table = Table::new(header);
    for j in joined {
        let values = j.record.map(|(r, _)| &r.values).unwrap_or(&empty);
        let membership = membership_cells(refs, j.company);
        for year in DATA_YEARS {
            let mut cells = vec![j.company.to_string(), year.to_string()];
            cells.extend(
                metrics
                    .iter()
                    .map(|m| cell(values, &FieldKey::yearly(m.to_string(), year))),
            );
            if derived {
                let fmt = |v: Option<f64>| v.map(crate::schema::format_number).unwrap_or_default();
                cells.push(fmt(values.s2(year)));
                cells.push(fmt(values.s12(year)));
                cells.push(fmt(values.s123(year)));
            }
            cells.extend(membership.iter().cloned());
            table.push(cells);
        }
    }
    table
}

/// A company answering the electric-utilities module outside a utility
/// industry, or a utility without it.
fn utility_mismatch(info: &CompanyInfo, values: &BTreeMap<FieldKey, ExtractedValue>) -> bool {
    if info.industry.is_none() {
        return false;
    }
    values
        .get(&FieldKey::scalar(UTILITY))
        .and_then(|v| v.value.as_ref())
        .map_or(false, |v| matches!(v, Value::Flag(f) if *f != info.is_utility()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Workbook;
    use crate::fixtures;
    use crate::schema::fields::*;
    use tempfile::tempdir;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    fn references() -> References {
        References::new(
            &table(
                "name,rank,country,sector,industry,type,revenue\n\
                 Globex,1,US,Energy,Electric Utilities,Public,500000\n\
                 Initech,2,DE,Technology,Software,Public,300000\n",
            ),
            &table(
                "company,member,joining year,status,baseline,baseline year,final year\n\
                 Globex,yes,2016,Active,0.1,2015,2050\n",
            ),
            &table(
                "company,member,joining year,status,scope t1,base year t1,target year t1,tco2e covered t1,% reduction t1\n\
                 Globex,yes,2017,Targets Set,S1+2 MB,2015,2030,1780,0.3\n",
            ),
        )
    }

    fn stored(dir: &Path, companies: &[&str]) -> Vec<StoredRow> {
        let mut book = Workbook::open(dir.join("workbook.csv")).unwrap();
        for company in companies {
            book.append(&fixtures::record(dir, company), &[]).unwrap();
        }
        book.records()
    }

    fn find<'a>(t: &'a Table, company: &str, year: Option<&str>) -> &'a [String] {
        t.rows()
            .iter()
            .find(|r| r[0] == company && year.map_or(true, |y| r[1] == y))
            .unwrap()
    }

    #[test]
    fn company_absent_from_reference_keeps_empty_initiative_columns() {
        let dir = tempdir().unwrap();
        let rows = stored(dir.path(), &["Acme Corp", "Globex"]);
        let db = Aggregator::default().aggregate(&rows, &references());

        let cov = &db.coverage;
        assert_eq!(cov.companies, 3);
        assert_eq!(cov.matched, vec!["Globex"]);
        assert_eq!(cov.only_in_records, vec!["Acme Corp"]);
        assert_eq!(cov.only_in_reference, vec!["Initech"]);
        assert!(cov.rejected.is_empty());

        let central = &db.central;
        let acme = find(central, "Acme Corp", None);
        assert_eq!(central.get(acme, "reporting year"), Some("2019"));
        assert_eq!(central.get(acme, "rank"), None);
        assert_eq!(central.get(acme, "re100 member"), None);
        assert_eq!(central.get(acme, "sbti joining year"), None);

        let initech = find(central, "Initech", None);
        assert_eq!(central.get(initech, "rank"), Some("2"));
        assert_eq!(central.get(initech, "status"), None);

        let emissions = &db.yearly[0].1;
        let row = find(emissions, "Acme Corp", Some("2018"));
        assert_eq!(emissions.get(row, S1), Some("1000"));
        assert_eq!(emissions.get(row, "re100 member"), None);
        assert_eq!(emissions.rows().len(), 3 * DATA_YEARS.count());
    }

    #[test]
    fn derived_emissions_prefer_market_based() {
        let dir = tempdir().unwrap();
        let rows = stored(dir.path(), &["Acme Corp"]);
        let db = Aggregator::default().aggregate(&rows, &References::default());

        let emissions = &db.yearly[0].1;
        let row = find(emissions, "Acme Corp", Some("2018"));
        let s1: f64 = emissions.get(row, S1).unwrap().parse().unwrap();
        let mb: f64 = emissions.get(row, S2_MB).unwrap().parse().unwrap();
        let s12: f64 = emissions.get(row, "S1+2").unwrap().parse().unwrap();
        assert_eq!(emissions.get(row, "S2"), emissions.get(row, S2_MB));
        assert_eq!(s12, s1 + mb);
    }

    #[test]
    fn initiative_views_cover_members() {
        let dir = tempdir().unwrap();
        let rows = stored(dir.path(), &["Globex"]);
        let db = Aggregator::default().aggregate(&rows, &references());

        let (initiative, re100) = &db.initiatives[0];
        assert_eq!(*initiative, Initiative::Re100);
        assert_eq!(re100.len(), DATA_YEARS.count());
        let r2015 = find(re100, "Globex", Some("2015"));
        assert_eq!(re100.get(r2015, "target ratio"), Some("0.1"));

        let (_, sbti) = &db.initiatives[1];
        let r2015 = find(sbti, "Globex", Some("2015"));
        assert_eq!(sbti.get(r2015, "targeted s1+2"), Some("1780"));

        let cov = &db.coverage.initiatives[&Initiative::Sbti];
        assert_eq!(cov.members, 1);
        assert_eq!(cov.members_with_records, 1);
    }

    #[test]
    fn rejected_rows_are_skipped() {
        let dir = tempdir().unwrap();
        let mut rows = stored(dir.path(), &["Acme Corp", "Globex"]);
        let bad = rows.iter_mut().find(|r| r.company == "Globex").unwrap();
        let key = FieldKey::yearly(S1, 2019);
        bad.values.get_mut(&key).unwrap().value = Some(Value::Number(-5.0));

        let db = Aggregator::default().aggregate(&rows, &references());
        assert_eq!(db.coverage.rejected, vec!["Globex"]);
        assert!(db.coverage.matched.is_empty());
        assert_eq!(db.coverage.only_in_reference, vec!["Globex", "Initech"]);
    }

    #[test]
    fn writes_every_table_and_the_summary() {
        let dir = tempdir().unwrap();
        let rows = stored(dir.path(), &["Acme Corp"]);
        let db = Aggregator::default().aggregate(&rows, &references());
        let out = dir.path().join("database");
        let written = db.write(&out).unwrap();

        for name in ["central.csv", "emissions.csv", "energy.csv", "s2mb.csv", "re100.csv", "sbti.csv", "coverage.json"] {
            assert!(out.join(name).exists(), "{name}");
        }
        assert_eq!(written.len(), 7);
        let json: serde_json::Value = serde_json::from_slice(&fs::read(out.join("coverage.json")).unwrap()).unwrap();
        assert_eq!(json["only_in_records"][0], "Acme Corp");
        assert_eq!(json["initiatives"]["RE100"]["members"], 1);
    }

    #[test]
    fn utility_answers_are_checked_against_industry() {
        let dir = tempdir().unwrap();
        let rows = stored(dir.path(), &["Globex", "Initech"]);
        let db = Aggregator::default().aggregate(&rows, &references());
        // fixtures leave the utility module out: a utility without it is suspicious
        assert_eq!(db.coverage.utility_mismatches, vec!["Globex"]);
    }
}
