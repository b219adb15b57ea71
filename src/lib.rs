//! CDP climate-questionnaire harvest pipeline.
//!
//! Five HTML questionnaires per company are loaded and fingerprinted
//! ([`load`]), mined for emissions, energy, sourcing and target answers
//! ([`extract`]), checked against a static rule set ([`validate`]) and written
//! as one row of a formula-carrying workbook ([`compose`]). The
//! [`aggregate`] stage later joins validated rows with reference tables into
//! flat CSV databases.

pub mod aggregate;
pub mod compose;
pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod schema;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{ComposeError, DuplicateCompanyError, LoadError, PipelineError, UnitParseError};
pub use load::{Layout, Role};
pub use schema::{CompanyRecord, ExtractedValue, FieldKey, Value};
