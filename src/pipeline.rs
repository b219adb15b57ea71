// src/pipeline.rs
//
// Wires load → extract → validate → compose for one company, and drives a
// batch of company folders. A failing company aborts only itself.

use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument, warn};

use crate::compose::{Composed, Workbook};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::extract_company;
use crate::load::load_company;
use crate::schema::CompanyRecord;
use crate::validate::{Severity, Status, Validator};

pub struct Pipeline {
    workbook: Workbook,
    validator: Validator,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub composed: Vec<Composed>,
    pub failed: Vec<PipelineError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Companies that failed for a reason other than already being in the
    /// workbook.
    pub fn hard_failures(&self) -> impl Iterator<Item = &PipelineError> {
        self.failed.iter().filter(|e| !e.is_duplicate())
    }
}

impl Pipeline {
    pub fn new(workbook: Workbook, validator: Validator) -> Self {
        Self { workbook, validator }
    }

    pub fn open(config: &PipelineConfig) -> Result<Self> {
        let workbook = Workbook::open(&config.workbook)
            .with_context(|| format!("opening workbook {}", config.workbook.display()))?
            .with_audit_dir(config.audit_dir())
            .with_sum_tolerance(config.sum_tolerance);
        Ok(Self::new(workbook, Validator::new(config.sum_tolerance)))
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Run the four stages for one company.
    #[instrument(level = "info", skip(self, paths), fields(files = paths.len()))]
    pub fn process_company<P: AsRef<Path>>(
        &mut self,
        company: &str,
        paths: &[P],
    ) -> Result<Composed, PipelineError> {
        // 1) load and fingerprint
        let set = load_company(company, paths, &self.workbook).map_err(|source| PipelineError::Load {
            company: company.to_string(),
            source,
        })?;

        // 2) extract
        let extraction = extract_company(&set).map_err(|source| PipelineError::Extract {
            company: company.to_string(),
            source,
        })?;

        // 3) validate
        let report = self.validator.validate(&extraction.values, extraction.reporting_year);
        for v in &report.violations {
            match v.severity {
                Severity::Reject => warn!(company, rule = %v.rule, "{}", v.message),
                Severity::Flag => info!(company, rule = %v.rule, "{}", v.message),
            }
        }
        let record = CompanyRecord::new(company, extraction.reporting_year, extraction.values, report);

        // 4) compose
        let composed = self
            .workbook
            .append(&record, &set.paths())
            .map_err(|source| PipelineError::Compose {
                company: company.to_string(),
                source,
            })?;

        if composed.status != Status::Rejected {
            let files: Vec<String> = composed.documents.iter().map(|p| p.display().to_string()).collect();
            info!(company, status = %composed.status, ?files, "done; questionnaires may be moved to collected");
        }
        Ok(composed)
    }

    /// Process every company folder under `companies_dir`.
    #[instrument(level = "info", skip(self), fields(dir = %companies_dir.display()))]
    pub fn run_batch(&mut self, companies_dir: &Path) -> Result<BatchReport> {
        let companies = discover(companies_dir)?;
        info!("{} company folders found", companies.len());

        let mut report = BatchReport::default();
        for (company, paths) in companies {
            match self.process_company(&company, &paths) {
                Ok(composed) => report.composed.push(composed),
                Err(e) if e.is_duplicate() => {
                    warn!(company = %company, "already in the workbook, skipped");
                    report.failed.push(e);
                }
                Err(e) => {
                    error!(company = %company, error = %e, "company failed");
                    report.failed.push(e);
                }
            }
        }

        info!(
            composed = report.composed.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        Ok(report)
    }
}

/// Company folders under `dir` and the HTML files in each, sorted by name.
pub fn discover(dir: &Path) -> Result<Vec<(String, Vec<PathBuf>)>> {
    let mut out = Vec::new();
    let mut folders: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();

    for folder in folders {
        let Some(company) = folder.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let pattern = format!("{}/*.html", glob::Pattern::escape(&folder.display().to_string()));
        let mut files: Vec<PathBuf> = glob(&pattern)
            .with_context(|| format!("bad glob pattern {}", pattern))?
            .filter_map(Result::ok)
            .collect();
        files.sort();
        if files.is_empty() {
            warn!(company = %company, "folder without questionnaires, skipped");
            continue;
        }
        out.push((company, files));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ComposeError, LoadError};
    use crate::fixtures;
    use tempfile::tempdir;

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            companies_dir: root.join("companies"),
            workbook: root.join("output").join("workbook.csv"),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn one_company_end_to_end() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let paths = fixtures::write_company(&config.companies_dir, "Acme Corp");

        let mut pipeline = Pipeline::open(&config).unwrap();
        let composed = pipeline.process_company("Acme Corp", &paths).unwrap();
        assert_eq!(composed.status, Status::Accepted, "{:?}", composed.flagged);
        assert!(composed.rejected.is_empty());
        assert_eq!(composed.documents.len(), 5);
        assert!(config.workbook.exists());
        assert!(dir.path().join("output/audit/Acme Corp.json").exists());
    }

    #[test]
    fn second_submission_is_a_duplicate_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let paths = fixtures::write_company(&config.companies_dir, "Acme Corp");

        let mut pipeline = Pipeline::open(&config).unwrap();
        pipeline.process_company("Acme Corp", &paths).unwrap();
        let before = fs::read(&config.workbook).unwrap();

        // same process
        let err = pipeline.process_company("Acme Corp", &paths).unwrap_err();
        assert!(err.is_duplicate());
        assert!(matches!(err, PipelineError::Load { source: LoadError::DuplicateCompany(_), .. }));

        // a fresh run against the same workbook
        let mut again = Pipeline::open(&config).unwrap();
        let err = again.process_company("Acme Corp", &paths).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(err.company(), "Acme Corp");
        assert_eq!(fs::read(&config.workbook).unwrap(), before);
        assert_eq!(again.workbook().len(), 1);
    }

    #[test]
    fn composer_refuses_a_duplicate_the_loader_did_not_see() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let record = fixtures::record(&config.companies_dir, "Acme Corp");

        let mut pipeline = Pipeline::open(&config).unwrap();
        pipeline.workbook.append(&record, &[]).unwrap();
        let err = pipeline.workbook.append(&record, &[]).unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateCompany(_)));
    }

    #[test]
    fn batch_continues_past_failures() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        fixtures::write_company(&config.companies_dir, "Acme Corp");
        fixtures::write_company(&config.companies_dir, "Globex");
        // a company with only four questionnaires
        let broken = fixtures::write_company(&config.companies_dir, "Broken Inc");
        fs::remove_file(&broken[0]).unwrap();
        // a company whose unit cannot be read
        fixtures::write_company_with(&config.companies_dir, "Furlong Ltd", |q| {
            if q.role() == crate::load::Role::Cdp2019 {
                q.scope1(&["1000 furlongs"]);
            }
        });

        let mut pipeline = Pipeline::open(&config).unwrap();
        let report = pipeline.run_batch(&config.companies_dir).unwrap();

        let done: Vec<&str> = report.composed.iter().map(|c| c.company.as_str()).collect();
        assert_eq!(done, vec!["Acme Corp", "Globex"]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_success());
        assert!(matches!(
            report.failed[0],
            PipelineError::Load { source: LoadError::WrongDocumentCount { count: 4, .. }, .. }
        ));
        assert!(matches!(report.failed[1], PipelineError::Extract { .. }));
        assert_eq!(report.hard_failures().count(), 2);

        // rerun: everything already there is a duplicate, nothing else changes
        let report = Pipeline::open(&config).unwrap().run_batch(&config.companies_dir).unwrap();
        assert!(report.composed.is_empty());
        assert_eq!(report.failed.iter().filter(|e| e.is_duplicate()).count(), 2);
    }

    #[test]
    fn discovery_lists_html_per_folder() {
        let dir = tempdir().unwrap();
        fixtures::write_company(dir.path(), "Acme Corp");
        fs::write(dir.path().join("Acme Corp").join("notes.txt"), "x").unwrap();
        fs::create_dir_all(dir.path().join("Empty")).unwrap();

        let found = discover(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "Acme Corp");
        assert_eq!(found[0].1.len(), 5);
    }
}
