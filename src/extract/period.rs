// src/extract/period.rs
//
// Reporting period (C0.2 / CC0.2): which calendar year a questionnaire
// describes and how many prior years it restates.

use chrono::{Datelike, NaiveDate};
use tracing::warn;

use super::RoleFields;
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument};
use crate::schema::fields::{REPORTING_END, REPORTING_START, REPORTING_YEAR, REPORTING_YEARS};
use crate::schema::FieldKey;

const MODERN_GRID: &str = "formatted_responses_matrix_set_grid_11995";
const LEGACY_MODULE: &str = "ORSMENU_0";

pub const MODERN_DATE: &str = "%B %d %Y";
pub const LEGACY_DATE: &str = "%a %d %b %Y";

/// Shortest and longest span, in days, accepted as one reporting year.
const MIN_DAYS: i64 = 361;
const MAX_DAYS: i64 = 369;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub year: u16,
    pub n_years: u16,
}

/// Calendar year a start/end pair covers: the start year when the period
/// opens in the first half of the year, the end year otherwise. `None` when
/// the dates are not about one year apart.
pub fn reporting_year_of(start: NaiveDate, end: NaiveDate) -> Option<u16> {
    let days = (end - start).num_days();
    if !(MIN_DAYS..=MAX_DAYS).contains(&days) {
        return None;
    }
    let year = if start.month() < 7 { start.year() } else { end.year() };
    u16::try_from(year).ok()
}

/// Parse a date pair and derive its reporting year, warning on the way.
pub(crate) fn year_of_texts(start: &str, end: &str, format: &str, what: &str) -> Option<(NaiveDate, NaiveDate, u16)> {
    let (Ok(s), Ok(e)) = (
        NaiveDate::parse_from_str(start.trim(), format),
        NaiveDate::parse_from_str(end.trim(), format),
    ) else {
        warn!(what, start, end, "unreadable dates");
        return None;
    };
    match reporting_year_of(s, e) {
        Some(year) => Some((s, e, year)),
        None => {
            warn!(what, start, end, "dates are not one year apart");
            None
        }
    }
}

/// Read the reporting period. Only the newest document's period becomes
/// output fields; older ones still steer their own locators.
pub(super) fn extract(
    doc: &QuestionnaireDocument,
    newest: bool,
    out: &mut RoleFields,
) -> Result<Option<ReportingPeriod>, UnitParseError> {
    let period = match doc.layout() {
        Layout::Modern => modern(doc),
        Layout::Legacy => legacy(doc),
    };

    let Some(period) = period else {
        warn!(role = %doc.role(), company = doc.company(), "no usable reporting period");
        return Ok(None);
    };
    if period.year != doc.role().data_year() {
        warn!(
            role = %doc.role(),
            company = doc.company(),
            year = period.year,
            "reporting period does not match the questionnaire cycle"
        );
    }

    if newest {
        let question = match doc.layout() {
            Layout::Modern => "C0.2",
            Layout::Legacy => "CC0.2",
        };
        out.number(
            FieldKey::scalar(REPORTING_YEARS),
            &period.n_years.to_string(),
            None,
            out.source(question, "Number of reported years"),
        )?;
        out.number(
            FieldKey::scalar(REPORTING_YEAR),
            &period.year.to_string(),
            None,
            out.source(question, "Reporting year"),
        )?;
        out.text(
            FieldKey::scalar(REPORTING_START),
            &period.start.to_string(),
            out.source(question, "Start date"),
        );
        out.text(
            FieldKey::scalar(REPORTING_END),
            &period.end.to_string(),
            out.source(question, "End date"),
        );
    }
    Ok(Some(ReportingPeriod {
        n_years: period.n_years.clamp(1, 4),
        ..period
    }))
}

fn modern(doc: &QuestionnaireDocument) -> Option<ReportingPeriod> {
    let table = doc.section(MODERN_GRID)?.default_table()?;
    if table.header.get(1).map(String::as_str) != Some("Start date") {
        warn!(role = %doc.role(), "C0.2 grid has an unexpected header");
        return None;
    }
    let row = table.rows.first()?;
    let (start, end, year) = year_of_texts(row.get(1)?, row.get(2)?, MODERN_DATE, "C0.2")?;

    // "Yes" + "2 years" means two years before the reporting year are given too
    let prior = row.get(4).map(String::as_str).unwrap_or("");
    let n_years = match row.get(3).map(String::as_str) {
        Some("Yes") if prior != "Please select" => prior
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map_or(1, |d| d as u16 + 1),
        _ => 1,
    };
    if !(1..=4).contains(&n_years) {
        warn!(role = %doc.role(), n_years, "C0.2 invalid number of reported years");
    }

    Some(ReportingPeriod {
        start,
        end,
        year,
        n_years,
    })
}

fn legacy(doc: &QuestionnaireDocument) -> Option<ReportingPeriod> {
    let table = doc.legacy_question(LEGACY_MODULE, "CC0.2")?.default_table()?;
    let cell = table.rows.first()?.first()?;
    let (start, end) = cell.split_once(" - ")?;
    let (start, end, year) = year_of_texts(start, end, LEGACY_DATE, "CC0.2")?;
    Some(ReportingPeriod {
        start,
        end,
        year,
        n_years: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn calendar_year() {
        assert_eq!(reporting_year_of(d(2019, 1, 1), d(2019, 12, 31)), Some(2019));
    }

    #[test]
    fn fiscal_year_takes_the_year_holding_most_months() {
        assert_eq!(reporting_year_of(d(2018, 4, 1), d(2019, 3, 31)), Some(2018));
        assert_eq!(reporting_year_of(d(2018, 7, 1), d(2019, 6, 30)), Some(2019));
    }

    #[test]
    fn spans_outside_a_year_are_rejected() {
        assert_eq!(reporting_year_of(d(2019, 1, 1), d(2019, 6, 30)), None);
        assert_eq!(reporting_year_of(d(2018, 1, 1), d(2019, 12, 31)), None);
    }

    #[test]
    fn both_date_formats() {
        let (_, _, y) = year_of_texts("January 1 2019", "December 31 2019", MODERN_DATE, "t").unwrap();
        assert_eq!(y, 2019);
        let (_, _, y) = year_of_texts("Fri 01 Jan 2016", "Sat 31 Dec 2016", LEGACY_DATE, "t").unwrap();
        assert_eq!(y, 2016);
        assert!(year_of_texts("soon", "later", MODERN_DATE, "t").is_none());
    }
}
