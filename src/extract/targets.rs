// src/extract/targets.rs
//
// Absolute emissions target (C4.1a). Only the first target listed is kept.

use super::{vocab, Context, RoleFields};
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument};
use crate::schema::fields::{
    TARGET_BASE_TCO2E, TARGET_BASE_YEAR, TARGET_REDUCTION, TARGET_SCOPE, TARGET_START_YEAR,
    TARGET_YEAR,
};
use crate::schema::FieldKey;

const HEADING: &str = "C4.1a";

const NUMBERS: [(&str, &str, Option<&str>); 5] = [
    (TARGET_BASE_YEAR, "Base year", None),
    (TARGET_START_YEAR, "Start year", None),
    (TARGET_YEAR, "Target year", None),
    (
        TARGET_BASE_TCO2E,
        "Base year emissions covered by target (metric tons CO2e)",
        Some("tCO2e"),
    ),
    (TARGET_REDUCTION, "Targeted % reduction from base year", Some("%")),
];

pub(super) fn extract(
    doc: &QuestionnaireDocument,
    _ctx: &Context,
    out: &mut RoleFields,
) -> Result<(), UnitParseError> {
    if doc.layout() != Layout::Modern {
        return Ok(());
    }
    let Some(q) = doc.section_by_heading(HEADING) else {
        return Ok(());
    };

    if let Some(scope) = q.value_after("Scope") {
        let source = out.source(HEADING, "Scope");
        out.category(FieldKey::scalar(TARGET_SCOPE), vocab::TARGET_SCOPE, &scope, source);
    }
    for (metric, label, assumed) in NUMBERS {
        if let Some(raw) = q.value_after(label) {
            out.number(FieldKey::scalar(metric), &raw, assumed, out.source(HEADING, label))?;
        }
    }
    Ok(())
}
