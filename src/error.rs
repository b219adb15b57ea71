// src/error.rs

use std::{io, path::PathBuf};
use thiserror::Error;

use crate::load::Role;

/// A company key that is already present in the output workbook.
#[derive(Debug, Error)]
#[error("company `{company}` already has a row in {}", location.display())]
pub struct DuplicateCompanyError {
    pub company: String,
    pub location: PathBuf,
}

/// A numeric answer carried a unit token the extractor does not know, or a
/// unit of the wrong dimension for the field.
#[derive(Debug, Error)]
#[error("{field}: unrecognised unit `{token}` in `{raw}` ({reason})")]
pub struct UnitParseError {
    pub field: String,
    pub token: String,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("`{company}`: expected 5 questionnaires, got {count}")]
    WrongDocumentCount { company: String, count: usize },

    #[error("{}: matches more than one questionnaire fingerprint {roles:?}", path.display())]
    RoleAmbiguous { path: PathBuf, roles: Vec<Role> },

    #[error("`{company}`: questionnaire roles missing {missing:?}")]
    RoleMissing { company: String, missing: Vec<Role> },

    #[error(transparent)]
    DuplicateCompany(#[from] DuplicateCompanyError),

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    DuplicateCompany(#[from] DuplicateCompanyError),

    #[error("{}: header does not match the current sheet layout", path.display())]
    HeaderMismatch { path: PathBuf },

    #[error("{}: audit file belongs to {owner:?}, not {company:?}", path.display())]
    AuditCollision {
        path: PathBuf,
        company: String,
        owner: String,
    },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialising audit record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Any failure that aborts one company. The batch driver reports it and moves
/// on to the next company.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{company}: {source}")]
    Load {
        company: String,
        #[source]
        source: LoadError,
    },

    #[error("{company}: {source}")]
    Extract {
        company: String,
        #[source]
        source: UnitParseError,
    },

    #[error("{company}: {source}")]
    Compose {
        company: String,
        #[source]
        source: ComposeError,
    },
}

impl PipelineError {
    pub fn company(&self) -> &str {
        match self {
            PipelineError::Load { company, .. }
            | PipelineError::Extract { company, .. }
            | PipelineError::Compose { company, .. } => company,
        }
    }

    /// True when the failure was a duplicate company key, from either the
    /// loader's pre-check or the composer's append.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            PipelineError::Load {
                source: LoadError::DuplicateCompany(_),
                ..
            } | PipelineError::Compose {
                source: ComposeError::DuplicateCompany(_),
                ..
            }
        )
    }
}
