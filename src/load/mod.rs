// src/load/mod.rs

pub mod document;
pub mod role;

pub use document::{Matrix, QuestionnaireDocument, Section};
pub use role::{detect_role, Detection, Layout, Role};

use scraper::Html;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use crate::error::{DuplicateCompanyError, LoadError};

/// Number of questionnaires expected per company, one per cycle.
pub const QUESTIONNAIRES_PER_COMPANY: usize = 5;

/// Anything that knows which companies already have an output row.
pub trait CompanyIndex {
    fn contains(&self, company: &str) -> bool;
    fn location(&self) -> &Path;
}

/// The five role-tagged questionnaires of one company, newest first.
pub struct QuestionnaireSet {
    company: String,
    docs: Vec<QuestionnaireDocument>,
}

impl QuestionnaireSet {
    pub fn company(&self) -> &str {
        &self.company
    }

    /// Documents ordered newest cycle first.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionnaireDocument> {
        self.docs.iter()
    }

    pub fn get(&self, role: Role) -> Option<&QuestionnaireDocument> {
        self.docs.iter().find(|d| d.role() == role)
    }

    pub fn newest(&self) -> &QuestionnaireDocument {
        &self.docs[0]
    }

    pub fn roles(&self) -> Vec<Role> {
        self.docs.iter().map(QuestionnaireDocument::role).collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.docs.iter().map(|d| d.path().to_path_buf()).collect()
    }
}

/// Read and fingerprint one company's questionnaires.
///
/// The duplicate check runs before any file is parsed. Input order does not
/// matter; the returned set is ordered by role.
#[instrument(level = "debug", skip(paths, index), fields(files = paths.len()))]
pub fn load_company<P: AsRef<Path>>(
    company: &str,
    paths: &[P],
    index: &dyn CompanyIndex,
) -> Result<QuestionnaireSet, LoadError> {
    if index.contains(company) {
        return Err(DuplicateCompanyError {
            company: company.to_string(),
            location: index.location().to_path_buf(),
        }
        .into());
    }

    if paths.len() != QUESTIONNAIRES_PER_COMPANY {
        return Err(LoadError::WrongDocumentCount {
            company: company.to_string(),
            count: paths.len(),
        });
    }

    let mut by_role: BTreeMap<Role, QuestionnaireDocument> = BTreeMap::new();
    for path in paths {
        let path = clean_path(path.as_ref());
        let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let html = Html::parse_document(&text);

        match detect_role(&html) {
            Detection::Unique(role) => {
                debug!(path = %path.display(), %role, "fingerprinted");
                if by_role.contains_key(&role) {
                    warn!(path = %path.display(), %role, "second file for the same cycle");
                    continue;
                }
                by_role.insert(role, QuestionnaireDocument::new(role, company, path, html));
            }
            Detection::Ambiguous(roles) => {
                return Err(LoadError::RoleAmbiguous { path, roles });
            }
            Detection::Unrecognised => {
                warn!(path = %path.display(), "not a recognised questionnaire");
            }
        }
    }

    let missing: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|r| !by_role.contains_key(r))
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::RoleMissing {
            company: company.to_string(),
            missing,
        });
    }

    let docs: Vec<QuestionnaireDocument> = by_role.into_values().rev().collect();
    info!(company, "loaded {} questionnaires", docs.len());
    Ok(QuestionnaireSet {
        company: company.to_string(),
        docs,
    })
}

/// Paths copied out of a browser or reference manager carry a `file://`
/// prefix.
fn clean_path(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix("file://")) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, EmptyIndex, Questionnaire};
    use std::collections::HashSet;
    use tempfile::tempdir;

    struct Taken(PathBuf);

    impl CompanyIndex for Taken {
        fn contains(&self, company: &str) -> bool {
            company == "Acme Corp"
        }
        fn location(&self) -> &Path {
            &self.0
        }
    }

    #[test]
    fn assigns_five_roles_in_any_order() {
        let tmp = tempdir().unwrap();
        let mut paths = fixtures::write_company(tmp.path(), "Acme Corp");
        let forward = load_company("Acme Corp", &paths, &EmptyIndex).unwrap();
        paths.reverse();
        paths.swap(0, 3);
        let shuffled = load_company("Acme Corp", &paths, &EmptyIndex).unwrap();

        let expected: Vec<Role> = Role::ALL.into_iter().rev().collect();
        assert_eq!(forward.roles(), expected);
        assert_eq!(shuffled.roles(), expected);
        let distinct: HashSet<Role> = shuffled.roles().into_iter().collect();
        assert_eq!(distinct.len(), 5);
        assert_eq!(shuffled.newest().role(), Role::Cdp2020);
    }

    #[test]
    fn accepts_file_urls() {
        let tmp = tempdir().unwrap();
        let paths: Vec<String> = fixtures::write_company(tmp.path(), "Acme Corp")
            .iter()
            .map(|p| format!("file://{}", p.display()))
            .collect();
        let set = load_company("Acme Corp", &paths, &EmptyIndex).unwrap();
        assert!(set.paths().iter().all(|p| p.exists()));
    }

    #[test]
    fn repeated_cycle_leaves_a_role_missing() {
        let tmp = tempdir().unwrap();
        let mut paths = fixtures::write_company(tmp.path(), "Acme Corp");
        let dup = tmp.path().join("dup.html");
        fs::write(&dup, Questionnaire::new(Role::Cdp2019).render()).unwrap();
        // replace the 2016 file with a second 2019 file
        let idx = paths
            .iter()
            .position(|p| fs::read_to_string(p).unwrap().contains("Climate Change 2016"))
            .unwrap();
        paths[idx] = dup;

        match load_company("Acme Corp", &paths, &EmptyIndex) {
            Err(LoadError::RoleMissing { missing, .. }) => assert_eq!(missing, vec![Role::Cdp2016]),
            other => panic!("expected RoleMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn ambiguous_file_aborts() {
        let tmp = tempdir().unwrap();
        let mut paths = fixtures::write_company(tmp.path(), "Acme Corp");
        let both = tmp.path().join("both.html");
        fs::write(
            &both,
            r#"<html><body>
                <div id="formatted_responses_ndp__container"><h1>Acme Corp - Climate Change 2018</h1></div>
                <div id="formatted_response__container"><h1>CDP Climate Change 2016 - Information Request</h1></div>
            </body></html>"#,
        )
        .unwrap();
        paths[0] = both.clone();

        match load_company("Acme Corp", &paths, &EmptyIndex) {
            Err(LoadError::RoleAmbiguous { path, roles }) => {
                assert_eq!(path, both);
                assert_eq!(roles, vec![Role::Cdp2016, Role::Cdp2018]);
            }
            other => panic!("expected RoleAmbiguous, got {:?}", other.err()),
        }
    }

    #[test]
    fn wrong_count_is_refused() {
        let tmp = tempdir().unwrap();
        let paths = fixtures::write_company(tmp.path(), "Acme Corp");
        let err = load_company("Acme Corp", &paths[..4], &EmptyIndex).err().unwrap();
        assert!(matches!(err, LoadError::WrongDocumentCount { count: 4, .. }));
    }

    #[test]
    fn existing_company_is_a_duplicate() {
        let tmp = tempdir().unwrap();
        let paths = fixtures::write_company(tmp.path(), "Acme Corp");
        let index = Taken(tmp.path().join("workbook.csv"));
        let err = load_company("Acme Corp", &paths, &index).err().unwrap();
        assert!(matches!(err, LoadError::DuplicateCompany(_)));
        // keys are case-sensitive
        assert!(load_company("ACME CORP", &paths, &index).is_ok());
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let tmp = tempdir().unwrap();
        let mut paths = fixtures::write_company(tmp.path(), "Acme Corp");
        paths[2] = tmp.path().join("nope.html");
        let err = load_company("Acme Corp", &paths, &EmptyIndex).err().unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
