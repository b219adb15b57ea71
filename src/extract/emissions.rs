// src/extract/emissions.rs
//
// Scope 1/2/3 emissions, base-year emissions, methodology and verification.

use tracing::{debug, warn};

use super::{answers_after, period, vocab, Context, RoleFields};
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument, Section};
use crate::schema::fields::{
    base_tco2e_metric, base_year_metric, METHODOLOGY, S1, S2_LB, S2_MB, VERIFICATION,
};
use crate::schema::{ExtractedValue, FieldKey, Value};

const LEGACY_MODULE: &str = "ORSMENU_3";

const SCOPE1_QUESTION: &str = "formatted_responses_question_18615";
const SCOPE2_QUESTION: &str = "formatted_responses_question_2816";
const SCOPE3_QUESTION: &str = "formatted_responses_question_2325";
// 2020 only: financial services report investments separately
const SCOPE3_INVESTMENTS: &str = "formatted_responses_question_87916";
const BASE_YEAR_QUESTIONS: [&str; 3] = [
    "formatted_responses_question_2723",
    "formatted_responses_question_2727",
    "formatted_responses_question_2731",
];
const METHODOLOGY_QUESTION: &str = "formatted_responses_question_12033";
const VERIFICATION_GRID: &str = "formatted_responses_matrix_set_grid_11582";

const SCOPE1_LABEL: &str = "Gross global Scope 1 emissions (metric tons CO2e)";
const SCOPE2_LB_LABEL: &str = "Scope 2, location-based";
const SCOPE2_MB_LABEL: &str = "Scope 2, market-based (if applicable)";
const SCOPE3_STATUS_LABEL: &str = "Evaluation status";
const SCOPE3_AMOUNT_LABELS: [&str; 2] = [
    "Metric tonnes CO2e",
    "Scope 3 portfolio emissions (metric tons CO2e)",
];

// labels that follow an empty answer cell
const STOPS: [&str; 5] = [
    "Start date",
    "End date",
    "End-year of reporting period",
    "Comment",
    "Scope 2, market-based (if applicable)",
];

pub(super) fn extract(
    doc: &QuestionnaireDocument,
    ctx: &Context,
    out: &mut RoleFields,
) -> Result<(), UnitParseError> {
    match doc.layout() {
        Layout::Modern => {
            scope1_modern(doc, ctx, out)?;
            scope2_modern(doc, ctx, out)?;
            if let Some(q) = doc.section(SCOPE3_QUESTION) {
                let mut texts = q.texts();
                if let Some(inv) = doc.section(SCOPE3_INVESTMENTS) {
                    texts.extend(inv.texts());
                }
                scope3_modern(&texts, out)?;
            } else {
                warn!(role = %doc.role(), "C6.5 scope 3 section missing");
            }
            // scalar answers; the merge keeps the newest cycle's
            base_year(doc, out)?;
            methodology(doc, out);
            verification(doc, out);
        }
        Layout::Legacy => legacy(doc, out)?,
    }
    Ok(())
}

/// Year of the i-th answer block: the first block is the cycle's own data
/// year, each further block one year earlier.
fn block_year(out: &RoleFields, i: usize) -> u16 {
    out.data_year() - i as u16
}

fn scope1_modern(doc: &QuestionnaireDocument, ctx: &Context, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(q) = doc.section(SCOPE1_QUESTION) else {
        warn!(role = %doc.role(), "C6.1 scope 1 section missing");
        return Ok(());
    };
    let texts = q.texts();
    let answers = answers_after(&texts, SCOPE1_LABEL, &STOPS);
    check_blocks(doc, &q, ctx, answers.len(), "C6.1");

    for (i, raw) in answers.into_iter().enumerate().take(usize::from(ctx.n_years)) {
        let Some(raw) = raw else {
            warn!(role = %doc.role(), block = i, "C6.1 scope 1 value empty");
            continue;
        };
        let key = FieldKey::yearly(S1, block_year(out, i));
        out.number(key, raw, Some("tCO2e"), out.source("C6.1", SCOPE1_LABEL))?;
    }
    Ok(())
}

fn scope2_modern(doc: &QuestionnaireDocument, ctx: &Context, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(q) = doc.section(SCOPE2_QUESTION) else {
        warn!(role = %doc.role(), "C6.3 scope 2 section missing");
        return Ok(());
    };
    let texts = q.texts();
    let lb = answers_after(&texts, SCOPE2_LB_LABEL, &STOPS);
    let mb = answers_after(&texts, SCOPE2_MB_LABEL, &STOPS);
    if lb.len() != mb.len() {
        warn!(role = %doc.role(), lb = lb.len(), mb = mb.len(), "C6.3 location/market-based block counts differ");
    }
    check_blocks(doc, &q, ctx, lb.len(), "C6.3");

    for (metric, label, answers) in [(S2_LB, SCOPE2_LB_LABEL, lb), (S2_MB, SCOPE2_MB_LABEL, mb)] {
        for (i, raw) in answers.into_iter().enumerate().take(usize::from(ctx.n_years)) {
            match raw {
                Some(raw) => {
                    let key = FieldKey::yearly(metric, block_year(out, i));
                    out.number(key, raw, Some("tCO2e"), out.source("C6.3", label))?;
                }
                None => warn!(role = %doc.role(), block = i, label, "C6.3 scope 2 value empty"),
            }
        }
    }
    Ok(())
}

/// Compare the number of answer blocks with C0.2, and each block's dates with
/// the year it is filed under.
fn check_blocks(doc: &QuestionnaireDocument, q: &Section<'_>, ctx: &Context, blocks: usize, code: &str) {
    if blocks != usize::from(ctx.n_years) {
        warn!(role = %doc.role(), code, blocks, expected = ctx.n_years, "answer blocks do not match C0.2");
    }
    let texts = q.texts();
    let starts = answers_after(&texts, "Start date", &STOPS);
    let ends = answers_after(&texts, "End date", &STOPS);
    for (i, (start, end)) in starts.into_iter().zip(ends).enumerate() {
        let (Some(start), Some(end)) = (start, end) else { continue };
        if start == "<Not Applicable>" || end == "<Not Applicable>" {
            continue;
        }
        let expected = doc.role().data_year() - i as u16;
        match period::year_of_texts(start, end, period::MODERN_DATE, code) {
            Some((_, _, year)) if year != expected => {
                warn!(role = %doc.role(), code, year, expected, "block dates do not match")
            }
            _ => {}
        }
    }
}

fn scope3_modern(texts: &[String], out: &mut RoleFields) -> Result<(), UnitParseError> {
    let year = out.data_year();
    let mut category: Option<&'static str> = None;
    let mut calculated = false;

    for (i, txt) in texts.iter().enumerate() {
        let next = texts.get(i + 1).map(String::as_str);
        if let Some(cat) = vocab::classify(vocab::SCOPE3_CATEGORY, txt) {
            category = Some(cat);
        } else if txt == SCOPE3_STATUS_LABEL {
            calculated = next.map_or(false, |s| vocab::SCOPE3_CALCULATED.contains(&s));
        } else if SCOPE3_AMOUNT_LABELS.contains(&txt.as_str()) {
            let Some(cat) = category else { continue };
            if calculated {
                let found = match next {
                    Some(raw) => out.number(FieldKey::yearly(cat, year), raw, Some("tCO2e"), out.source("C6.5", txt))?,
                    None => false,
                };
                if !found {
                    warn!(role = %out.role(), category = cat, "C6.5 category marked calculated without a value");
                }
            } else {
                debug!(role = %out.role(), category = cat, "C6.5 category not calculated, omitted");
            }
            calculated = false;
        }
    }
    Ok(())
}

/// C5.1: one block per scope with a base-year period and an amount.
fn base_year(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    for id in BASE_YEAR_QUESTIONS {
        let Some(q) = doc.section(id) else { continue };
        let texts = q.texts();
        let heading = texts.first().map(String::as_str).unwrap_or("");
        let scope = if heading.contains("Scope 1") {
            S1
        } else if heading.contains("Scope 2 (location-based)") {
            S2_LB
        } else if heading.contains("Scope 2 (market-based)") {
            S2_MB
        } else {
            warn!(role = %doc.role(), heading, "C5.1 block without a recognised scope");
            continue;
        };

        let amount = q.value_after("Base year emissions (metric tons CO2e)");
        let Some(amount) = amount.filter(|a| !super::units::is_placeholder(a)) else {
            warn!(role = %doc.role(), scope, "C5.1 base year emissions not given");
            continue;
        };
        out.number(
            FieldKey::scalar(base_tco2e_metric(scope)),
            &amount,
            Some("tCO2e"),
            out.source("C5.1", "Base year emissions (metric tons CO2e)"),
        )?;

        if let (Some(start), Some(end)) = (q.value_after("Base year start"), q.value_after("Base year end")) {
            if let Some((_, _, year)) = period::year_of_texts(&start, &end, period::MODERN_DATE, "C5.1") {
                let raw = format!("{} - {}", start, end);
                let source = out.source("C5.1", "Base year start");
                out.set(ExtractedValue::found(
                    FieldKey::scalar(base_year_metric(scope)),
                    Value::Number(f64::from(year)),
                    raw,
                    source,
                ));
            }
        }
    }
    Ok(())
}

/// C5.2: the first recognised standard anywhere in the answer.
fn methodology(doc: &QuestionnaireDocument, out: &mut RoleFields) {
    let Some(q) = doc.section(METHODOLOGY_QUESTION) else { return };
    let texts = q.texts();
    let key = FieldKey::scalar(METHODOLOGY);
    let source = out.source("C5.2", "");

    match texts.iter().find_map(|t| vocab::classify_contains(vocab::METHODOLOGY, t).map(|c| (c, t))) {
        Some((canonical, raw)) => {
            out.set(ExtractedValue::found(key, Value::Category(canonical.into()), raw.as_str(), source))
        }
        None => {
            let raw = texts.iter().skip(1).cloned().collect::<Vec<_>>().join(" | ");
            warn!(role = %doc.role(), "C5.2 no common standard, recorded as Other");
            out.set(ExtractedValue::uncontrolled(key, Value::Category("Other".into()), raw, source));
        }
    }
}

/// C10.1: verification status per scope.
fn verification(doc: &QuestionnaireDocument, out: &mut RoleFields) {
    let Some(table) = doc.section(VERIFICATION_GRID).and_then(|s| s.default_table()) else {
        return;
    };
    for (metric, scope) in VERIFICATION.iter().zip(["Scope 1", "Scope 2", "Scope 3"]) {
        let Some(row) = table.rows.iter().find(|r| r.first().map_or(false, |c| c.starts_with(scope))) else {
            continue;
        };
        if let Some(answer) = row.get(1) {
            let source = out.source("C10.1", scope);
            out.category(FieldKey::scalar(*metric), vocab::VERIFICATION, answer, source);
        }
    }
}

fn legacy(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let year = out.data_year();

    // CC8.2: heading, question, answer
    match doc.legacy_question(LEGACY_MODULE, "CC8.2") {
        Some(q) => {
            let texts = q.texts();
            let raw = texts.get(2).map(String::as_str).unwrap_or("");
            if !out.number(FieldKey::yearly(S1, year), raw, Some("tCO2e"), out.source("CC8.2", ""))? {
                warn!(role = %doc.role(), "CC8.2 scope 1 empty");
            }
        }
        None => warn!(role = %doc.role(), "CC8.2 missing"),
    }

    // CC8.3a: first body row holds location-based then market-based
    if let Some(row) = doc
        .legacy_question(LEGACY_MODULE, "CC8.3a")
        .and_then(|q| q.default_table())
        .and_then(|t| t.rows.into_iter().next())
    {
        for (metric, raw, label) in [(S2_LB, row.first(), "location-based"), (S2_MB, row.get(1), "market-based")] {
            let raw = raw.map(String::as_str).unwrap_or("");
            if !out.number(FieldKey::yearly(metric, year), raw, Some("tCO2e"), out.source("CC8.3a", label))? {
                warn!(role = %doc.role(), label, "CC8.3a scope 2 empty");
            }
        }
    } else {
        warn!(role = %doc.role(), "CC8.3a missing");
    }

    // CC14.1: category | evaluation status | tCO2e
    if let Some(table) = doc
        .legacy_question(LEGACY_MODULE, "CC14.1")
        .and_then(|q| q.default_table())
    {
        for row in &table.rows {
            let Some(cat) = row.first().and_then(|c| vocab::classify(vocab::SCOPE3_CATEGORY, c)) else {
                continue;
            };
            let calculated = row
                .get(1)
                .map_or(false, |s| vocab::SCOPE3_CALCULATED.contains(&s.as_str()));
            if !calculated {
                continue;
            }
            let raw = row.get(2).map(String::as_str).unwrap_or("");
            if !out.number(FieldKey::yearly(cat, year), raw, Some("tCO2e"), out.source("CC14.1", cat))? {
                warn!(role = %doc.role(), category = cat, "CC14.1 category marked calculated without a value");
            }
        }
    }
    Ok(())
}
