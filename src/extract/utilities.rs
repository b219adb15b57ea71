// src/extract/utilities.rs
//
// Electric utility module (C-EU8.2d): generation capacity, output and
// emissions per technology. Read from the newest questionnaire only.

use tracing::{debug, warn};

use super::{vocab, Context, RoleFields};
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument, QuestionnaireSet};
use crate::schema::fields::{utility_metric, UTILITY};
use crate::schema::FieldKey;

const UTILITY_QUESTION: &str = "formatted_responses_question_8602";

/// Answer labels, the measure they feed and the unit the label implies.
const MEASURES: [(&str, &str, &str); 4] = [
    ("Nameplate capacity (MW)", "capacity", "MW"),
    ("Gross electricity generation (GWh)", "gross", "GWh"),
    ("Net electricity generation (GWh)", "net", "GWh"),
    ("Absolute scope 1 emissions (metric tons CO2e)", "emissions", "tCO2e"),
];
// closes a technology block
const INTENSITY_LABEL: &str = "Scope 1 emissions intensity (metric tons CO2e per GWh)";

/// Capacity above this many MW for one technology is implausible.
const MAX_CAPACITY_MW: f64 = 50_000.0;

pub(super) fn extract(
    doc: &QuestionnaireDocument,
    ctx: &Context,
    out: &mut RoleFields,
) -> Result<(), UnitParseError> {
    if !ctx.newest || doc.layout() != Layout::Modern {
        return Ok(());
    }
    let section = doc.section(UTILITY_QUESTION);
    out.flag(
        FieldKey::scalar(UTILITY),
        section.is_some(),
        out.source("C-EU8.2d", ""),
    );
    let Some(section) = section else { return Ok(()) };

    // the first text is the question heading
    let texts = section.texts();
    let mut technology: Option<&'static str> = None;

    for (i, txt) in texts.iter().enumerate().skip(1) {
        if let Some(tech) = vocab::classify(vocab::UTILITY_TECHNOLOGY, txt) {
            technology = Some(tech);
            continue;
        }
        let Some(tech) = technology else { continue };
        if txt == INTENSITY_LABEL {
            check_plausible(out, tech);
            technology = None;
            continue;
        }
        let Some((label, measure, unit)) = MEASURES.iter().find(|(l, _, _)| l == txt) else {
            continue;
        };
        let raw = texts.get(i + 1).map(String::as_str).unwrap_or("");
        let key = FieldKey::scalar(utility_metric(measure, tech));
        out.add_number(key, raw, Some(*unit), out.source("C-EU8.2d", label))?;
    }
    Ok(())
}

fn check_plausible(out: &RoleFields, tech: &str) {
    let get = |measure: &str| {
        out.get(&FieldKey::scalar(utility_metric(measure, tech)))
            .and_then(|v| v.number())
            .unwrap_or(0.0)
    };
    let (capacity, gross, net) = (get("capacity"), get("gross"), get("net"));
    // a plant running all year at nameplate capacity, in MWh
    let max_generation = capacity * 365.0 * 24.0;

    if net > gross {
        warn!(role = %out.role(), technology = tech, "C-EU8.2d net generation above gross");
    }
    if gross > max_generation || net > max_generation {
        warn!(role = %out.role(), technology = tech, gross, max_generation, "C-EU8.2d generation above capacity");
    }
    if capacity > MAX_CAPACITY_MW {
        warn!(role = %out.role(), technology = tech, capacity, "C-EU8.2d capacity above threshold");
    }
}

/// Warn when the utility module appears in some modern questionnaires and
/// not in others.
pub(super) fn check_flag_history(set: &QuestionnaireSet) {
    let presence: Vec<(String, bool)> = set
        .iter()
        .filter(|d| d.layout() == Layout::Modern)
        .map(|d| (d.role().to_string(), d.section(UTILITY_QUESTION).is_some()))
        .collect();
    let first = presence.first().map(|(_, p)| *p);
    if presence.iter().any(|(_, p)| Some(*p) != first) {
        warn!(company = set.company(), ?presence, "utility module present in only some questionnaires");
    } else {
        debug!(company = set.company(), utility = ?first, "utility module consistent");
    }
}
