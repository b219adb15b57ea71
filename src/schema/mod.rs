pub mod fields;
pub mod types;

pub use fields::{schema, Group, Metric, Schema, DATA_YEARS};
pub use types::{
    format_number, unquote_cell, CompanyRecord, ExtractedValue, ExtractionStatus, FieldKey, SourceLocation, Unit, Value,
    ValueKind,
};
