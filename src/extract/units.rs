// src/extract/units.rs
//
// Numeric answer parsing with unit normalisation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::UnitParseError;
use crate::schema::Unit;

/// Answers that mean "nothing reported".
const PLACEHOLDERS: [&str; 8] = [
    "",
    "<not applicable>",
    "n/a",
    "na",
    "-",
    "please select",
    "question not applicable",
    "no data",
];

// thousands separated by comma, space, no-break or narrow no-break space
static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([-+]?(?:\d{1,3}(?:[,\u{a0}\u{202f} ]\d{3})+|\d+)(?:\.\d+)?(?:[eE][-+]?\d+)?|[-+]?\.\d+)\s*(.*)$",
    )
    .expect("static regex")
});

// what a trailing unit token looks like; anything else is prose
static UNIT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:%|[A-Za-z][A-Za-z0-9₂ /-]*\.?)$").expect("static regex"));

/// Result of reading one numeric answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    Missing,
    Number(f64),
    /// Text that does not start with a number; kept for review.
    Prose(String),
}

/// Known unit spellings, lower-cased with whitespace removed.
fn lookup(token: &str) -> Option<(Unit, f64)> {
    let t: String = token
        .trim_end_matches('.')
        .to_lowercase()
        .replace('₂', "2")
        .split_whitespace()
        .collect();
    let hit = match t.as_str() {
        "t" | "tco2e" | "tco2" | "tco2-e" | "metrictonsco2e" | "metrictonnesco2e" | "tonnesco2e"
        | "tonsco2e" | "tonnes" => (Unit::TonnesCo2e, 1.0),
        "kgco2e" | "kg" => (Unit::TonnesCo2e, 1e-3),
        "ktco2e" | "kt" | "kilotonnesco2e" => (Unit::TonnesCo2e, 1e3),
        "mtco2e" | "milliontonnesco2e" => (Unit::TonnesCo2e, 1e6),
        "kwh" => (Unit::MegawattHours, 1e-3),
        "mwh" => (Unit::MegawattHours, 1.0),
        "gwh" => (Unit::MegawattHours, 1e3),
        "twh" => (Unit::MegawattHours, 1e6),
        "mj" => (Unit::MegawattHours, 1.0 / 3600.0),
        "gj" => (Unit::MegawattHours, 1.0 / 3.6),
        "tj" => (Unit::MegawattHours, 1000.0 / 3.6),
        "kw" => (Unit::Megawatts, 1e-3),
        "mw" => (Unit::Megawatts, 1.0),
        "gw" => (Unit::Megawatts, 1e3),
        "%" | "percent" => (Unit::Percent, 1.0),
        _ => return None,
    };
    Some(hit)
}

pub fn is_placeholder(raw: &str) -> bool {
    let t = raw.trim().to_lowercase();
    PLACEHOLDERS.contains(&t.as_str())
}

/// Parse `raw` as a quantity in `target` units.
///
/// `assumed` is the unit implied by the question label (e.g. `GWh` for
/// "Gross electricity generation (GWh)") and applies when the answer carries
/// no token of its own. A token that is present but unknown, or of another
/// dimension, is an error.
pub fn parse_quantity(
    field: &str,
    raw: &str,
    target: Unit,
    assumed: Option<&str>,
) -> Result<Quantity, UnitParseError> {
    let text = raw.trim();
    if is_placeholder(text) {
        return Ok(Quantity::Missing);
    }

    let Some(caps) = NUMBER.captures(text) else {
        return Ok(Quantity::Prose(text.to_string()));
    };
    let digits: String = caps[1]
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    let Ok(value) = digits.parse::<f64>() else {
        return Ok(Quantity::Prose(text.to_string()));
    };

    let token = caps[2].trim();
    if !token.is_empty() && !UNIT_TOKEN.is_match(token) {
        return Ok(Quantity::Prose(text.to_string()));
    }
    let token = if token.is_empty() { assumed } else { Some(token) };

    let factor = match (token, target) {
        (None, _) => 1.0,
        (Some(tok), Unit::Year | Unit::Count) => {
            return Err(error(field, tok, raw, "field takes a bare number"))
        }
        (Some(tok), target) => match lookup(tok) {
            Some((unit, factor)) if unit == target => factor,
            Some((unit, _)) => {
                return Err(error(
                    field,
                    tok,
                    raw,
                    &format!("{} given, {} expected", unit.label(), target.label()),
                ))
            }
            None => return Err(error(field, tok, raw, "unknown unit")),
        },
    };

    Ok(Quantity::Number(value * factor))
}

fn error(field: &str, token: &str, raw: &str, reason: &str) -> UnitParseError {
    UnitParseError {
        field: field.to_string(),
        token: token.to_string(),
        raw: raw.to_string(),
        reason: reason.to_string(),
    }
}
