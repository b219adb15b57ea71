// src/extract/sourcing.rs
//
// Market-based Scope 2 low-carbon sourcing (C8.2e / CC11.4).

use tracing::warn;

use super::units::{parse_quantity, Quantity};
use super::{vocab, Context, RoleFields};
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument};
use crate::schema::fields::{sourcing_metric, S2MB_TOTAL, S2MB_UNCLASSIFIED};
use crate::schema::{ExtractedValue, FieldKey, Unit, Value};

const LEGACY_MODULE: &str = "ORSMENU_3";
const SOURCING_QUESTION: &str = "formatted_responses_question_11576";

const METHOD_LABELS: [&str; 2] = [
    "Sourcing method",
    "Basis for applying a low-carbon emission factor",
];
const TECHNOLOGY_LABEL: &str = "Low-carbon technology type";
const REGION_LABELS: [&str; 2] = [
    "Region of consumption of low-carbon electricity, heat, steam or cooling",
    "Country/region of consumption of low-carbon electricity, heat, steam or cooling",
];
const MWH_LABELS: [&str; 2] = [
    "MWh consumed accounted for at a zero emission factor",
    "MWh consumed associated with low-carbon electricity, heat, steam or cooling",
];

/// One sourcing row as read from the questionnaire.
#[derive(Debug, Default)]
struct Row {
    instrument: Option<&'static str>,
    technologies: Vec<&'static str>,
}

/// Accumulates one questionnaire's sourcing rows.
struct Tally<'a> {
    out: &'a mut RoleFields,
    question: &'static str,
    unclassified: Vec<String>,
}

impl<'a> Tally<'a> {
    fn new(out: &'a mut RoleFields, question: &'static str) -> Self {
        Self {
            out,
            question,
            unclassified: Vec::new(),
        }
    }

    fn key(&self, metric: impl Into<std::borrow::Cow<'static, str>>) -> FieldKey {
        FieldKey::yearly(metric, self.out.data_year())
    }

    /// Book one row's MWh against its instrument, its technologies (split
    /// evenly) and the total.
    fn book(&mut self, row: &Row, raw: &str) -> Result<(), UnitParseError> {
        let total_key = self.key(S2MB_TOTAL);
        let mwh = match parse_quantity(&total_key.to_string(), raw, Unit::MegawattHours, Some("MWh"))? {
            Quantity::Number(n) => n,
            Quantity::Missing => return Ok(()),
            Quantity::Prose(text) => {
                self.unclassified.push(format!("MWh: {}", text));
                return Ok(());
            }
        };

        let source = self.out.source(self.question, "MWh");
        self.out.accumulate(total_key, mwh, raw, source.clone());
        if let Some(instrument) = row.instrument {
            let key = self.key(sourcing_metric(instrument));
            self.out.accumulate(key, mwh, raw, source.clone());
        }
        if !row.technologies.is_empty() {
            let share = mwh / row.technologies.len() as f64;
            for tech in &row.technologies {
                let key = self.key(sourcing_metric(tech));
                self.out.accumulate(key, share, raw, source.clone());
            }
        }
        Ok(())
    }

    fn unclassified(&mut self, what: &str, text: &str) {
        self.unclassified.push(format!("{}: {}", what, text));
    }

    fn finish(self) {
        if self.unclassified.is_empty() {
            return;
        }
        warn!(
            role = %self.out.role(),
            count = self.unclassified.len(),
            "{} sourcing values need checking",
            self.question
        );
        let text = self.unclassified.join("; ");
        let key = FieldKey::yearly(S2MB_UNCLASSIFIED, self.out.data_year());
        let source = self.out.source(self.question, "");
        self.out
            .set(ExtractedValue::uncontrolled(key, Value::Text(text.clone()), text, source));
    }
}

pub(super) fn extract(
    doc: &QuestionnaireDocument,
    _ctx: &Context,
    out: &mut RoleFields,
) -> Result<(), UnitParseError> {
    match doc.layout() {
        Layout::Modern => modern(doc, out),
        Layout::Legacy => legacy(doc, out),
    }
}

fn modern(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(q) = doc.section(SOURCING_QUESTION) else {
        // optional section
        return Ok(());
    };
    let texts = q.texts();
    let mut tally = Tally::new(out, "C8.2e");
    let mut row = Row::default();
    let mut in_technologies = false;

    for (i, txt) in texts.iter().enumerate() {
        let next = texts.get(i + 1).map(|s| s.trim()).unwrap_or("");

        if METHOD_LABELS.contains(&txt.as_str()) {
            in_technologies = false;
            row = Row::default();
            if vocab::is_no_purchase(next) {
                break;
            }
            row.instrument = vocab::classify(vocab::SOURCING_INSTRUMENT, next);
            if row.instrument.is_none() {
                tally.unclassified("instrument", next);
            }
        } else if txt == TECHNOLOGY_LABEL {
            in_technologies = true;
        } else if REGION_LABELS.contains(&txt.as_str()) {
            in_technologies = false;
        } else if MWH_LABELS.contains(&txt.as_str()) {
            in_technologies = false;
            tally.book(&row, next)?;
            row = Row::default();
        } else if in_technologies {
            match vocab::classify(vocab::SOURCING_TECHNOLOGY, txt) {
                Some(tech) => row.technologies.push(tech),
                None => tally.unclassified("technology", txt.trim()),
            }
        }
    }
    tally.finish();
    Ok(())
}

/// CC11.4: instrument | MWh, one row per instrument, no technologies.
fn legacy(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(table) = doc
        .legacy_question(LEGACY_MODULE, "CC11.4")
        .and_then(|q| q.default_table())
    else {
        return Ok(());
    };
    let rows = table.rows.len();
    let mut tally = Tally::new(out, "CC11.4");

    for cells in &table.rows {
        let method = cells.first().map(|s| s.trim()).unwrap_or("");
        if method.is_empty() {
            continue;
        }
        if method.contains("No purchases or generation of low carbon") {
            if rows > 1 {
                warn!(role = %doc.role(), "CC11.4 'No purchases' given alongside other rows");
                continue;
            }
            break;
        }
        let row = Row {
            instrument: vocab::classify(vocab::SOURCING_INSTRUMENT, method),
            technologies: Vec::new(),
        };
        if row.instrument.is_none() {
            tally.unclassified("instrument", method);
        }
        let raw = cells.get(1).map(String::as_str).unwrap_or("");
        tally.book(&row, raw)?;
    }
    tally.finish();
    Ok(())
}
