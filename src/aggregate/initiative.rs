// src/aggregate/initiative.rs
//
// Initiative views: a membership predicate plus a function deriving extra
// per-year columns from the company's figures and its membership row.

use std::collections::BTreeMap;
use tracing::warn;

use super::reference::{Initiative, Membership};
use crate::schema::fields::*;
use crate::schema::{format_number, ExtractedValue, FieldKey, Value};

/// Read access to a company's validated figures.
pub trait Figures {
    fn value(&self, metric: &str, year: u16) -> Option<f64>;
    fn scalar(&self, metric: &str) -> Option<f64>;
    fn text(&self, metric: &str) -> Option<&str>;

    /// Scope 2, market-based where given, location-based otherwise.
    fn s2(&self, year: u16) -> Option<f64> {
        self.value(S2_MB, year).or_else(|| self.value(S2_LB, year))
    }

    fn s12(&self, year: u16) -> Option<f64> {
        Some(self.value(S1, year)? + self.s2(year)?)
    }

    /// S1+2 plus every reported Scope 3 category; empty without Scope 3.
    fn s123(&self, year: u16) -> Option<f64> {
        let s3: Vec<f64> = SCOPE3_CATEGORIES.iter().filter_map(|c| self.value(c, year)).collect();
        if s3.is_empty() {
            return None;
        }
        Some(self.s12(year)? + s3.iter().sum::<f64>())
    }

    /// Purchased plus self-consumed generated electricity.
    fn electricity_total(&self, year: u16) -> Option<f64> {
        Some(self.value(CT_ELECTRICITY, year)? + self.value(GT_SELF_ELECTRICITY, year).unwrap_or(0.0))
    }

    fn electricity_renewable(&self, year: u16) -> Option<f64> {
        Some(self.value(CR_ELECTRICITY, year)? + self.value(GR_SELF_ELECTRICITY, year).unwrap_or(0.0))
    }

    fn renewable_ratio(&self, year: u16) -> Option<f64> {
        let total = self.electricity_total(year)?;
        (total > 0.0).then(|| self.electricity_renewable(year).unwrap_or(0.0) / total)
    }
}

impl Figures for BTreeMap<FieldKey, ExtractedValue> {
    fn value(&self, metric: &str, year: u16) -> Option<f64> {
        self.get(&FieldKey::yearly(metric.to_string(), year))?.number()
    }

    fn scalar(&self, metric: &str) -> Option<f64> {
        self.get(&FieldKey::scalar(metric.to_string()))?.number()
    }

    fn text(&self, metric: &str) -> Option<&str> {
        self.get(&FieldKey::scalar(metric.to_string()))?
            .value
            .as_ref()
            .and_then(Value::as_str)
    }
}

/// Linear interpolation through `points` (sorted by x). `None` before the
/// first point; the last value holds after the last point.
pub fn interpolate(points: &[(f64, f64)], x: f64) -> Option<f64> {
    let first = points.first()?;
    if x < first.0 {
        return None;
    }
    for pair in points.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x <= x1 {
            if x1 == x0 {
                return Some(y1);
            }
            return Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0));
        }
    }
    points.last().map(|p| p.1)
}

pub struct InitiativeView {
    pub initiative: Initiative,
    pub columns: &'static [&'static str],
    includes: fn(&Membership) -> bool,
    derive: fn(&Membership, &dyn Figures, u16) -> Vec<Option<f64>>,
}

impl InitiativeView {
    pub fn includes(&self, membership: &Membership) -> bool {
        (self.includes)(membership)
    }

    /// Derived cells for one company and data year.
    pub fn derive(&self, membership: &Membership, figures: &dyn Figures, year: u16) -> Vec<String> {
        (self.derive)(membership, figures, year)
            .into_iter()
            .map(|v| v.map(format_number).unwrap_or_default())
            .collect()
    }
}

pub fn views() -> [InitiativeView; 2] {
    [re100(), sbti()]
}

// ─── RE100 ──────────────────────────────────────────────────────────────

pub fn re100() -> InitiativeView {
    InitiativeView {
        initiative: Initiative::Re100,
        columns: &["total electricity", "renewable electricity", "re ratio", "target ratio"],
        includes: |m| m.member,
        derive: |m, f, year| {
            vec![
                f.electricity_total(year),
                f.electricity_renewable(year),
                f.renewable_ratio(year),
                re100_target_ratio(m, f, year),
            ]
        },
    }
}

/// Year the RE100 trajectory starts from: given, or the year before joining
/// (joiners of 2014 and 2015 keep their joining year).
fn re100_baseline_year(m: &Membership) -> Option<u16> {
    m.year("baseline year").or_else(|| match m.joining_year? {
        y @ (2014 | 2015) => Some(y),
        y => y.checked_sub(1),
    })
}

/// Targeted share of renewable electricity in `year`, linear between the
/// baseline, any interim targets and 100% in the final year. Without interim
/// targets a 2050 commitment passes 60% in 2030 and 90% in 2040.
pub fn re100_target_ratio(m: &Membership, f: &dyn Figures, year: u16) -> Option<f64> {
    let base_year = re100_baseline_year(m)?;
    let baseline = m.ratio("baseline").or_else(|| f.renewable_ratio(base_year))?;
    let final_year = m.year("final year").unwrap_or(2050);

    if baseline >= 1.0 {
        return (year >= base_year).then_some(1.0);
    }

    let mut points = vec![(f64::from(base_year), baseline)];
    match (m.year("interim year 1"), m.ratio("interim target 1")) {
        (None, _) if final_year == 2050 => {
            points.extend([(2030.0, 0.6), (2040.0, 0.9)]);
        }
        (Some(y1), Some(t1)) => {
            points.push((f64::from(y1), t1));
            if let (Some(y2), Some(t2)) = (m.year("interim year 2"), m.ratio("interim target 2")) {
                points.push((f64::from(y2), t2));
            }
        }
        (Some(y1), None) => {
            warn!(company = %m.company, interim_year = y1, "RE100 interim year without a target, ignored");
        }
        (None, _) => {}
    }
    points.push((f64::from(final_year), 1.0));
    if final_year != 2050 {
        points.push((2050.0, 1.0));
    }
    points.retain(|p| p.0 >= f64::from(base_year));
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    interpolate(&points, f64::from(year))
}

// ─── SBTi ───────────────────────────────────────────────────────────────

pub fn sbti() -> InitiativeView {
    InitiativeView {
        initiative: Initiative::Sbti,
        columns: &["actual s1+2", "targeted s1+2"],
        includes: |m| {
            m.member
                && !m
                    .status
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case("committed"))
                    .unwrap_or(false)
        },
        derive: |m, f, year| {
            let targets = sbti_targets(m, f);
            let scope = targets.first().map(|t| t.scope.as_str());
            vec![actual_s12(f, scope, year), sbti_targeted(&targets, year)]
        },
    }
}

/// Most absolute targets listed per company in the SBTi sheet.
pub const SBTI_MAX_TARGETS: usize = 7;

/// One absolute Scope 1+2 target.
#[derive(Debug, Clone, PartialEq)]
pub struct SbtiTarget {
    pub scope: String,
    pub base_year: u16,
    pub target_year: u16,
    pub base_tco2e: f64,
    /// Fraction, 0..=1.
    pub reduction: f64,
}

impl SbtiTarget {
    pub fn targeted_tco2e(&self) -> f64 {
        (1.0 - self.reduction) * self.base_tco2e
    }
}

fn is_s12(scope: &str) -> bool {
    matches!(scope, "S1+2 LB" | "S1+2 MB")
}

/// Scope 1+2 targets, nearest target year first: from the membership row's
/// `… t1`..`… t7` columns, else the company's own questionnaire answer.
pub fn sbti_targets(m: &Membership, f: &dyn Figures) -> Vec<SbtiTarget> {
    let mut targets: Vec<SbtiTarget> = (1..=SBTI_MAX_TARGETS)
        .filter_map(|n| {
            let scope = m.text(&format!("scope t{}", n))?;
            if !is_s12(scope) {
                return None;
            }
            Some(SbtiTarget {
                scope: scope.to_string(),
                base_year: m.year(&format!("base year t{}", n))?,
                target_year: m.year(&format!("target year t{}", n))?,
                base_tco2e: m.number(&format!("tco2e covered t{}", n))?,
                reduction: m.ratio(&format!("% reduction t{}", n))?,
            })
        })
        .collect();

    if targets.is_empty() {
        let own = (|| {
            let scope = f.text(TARGET_SCOPE).filter(|s| is_s12(s))?;
            Some(SbtiTarget {
                scope: scope.to_string(),
                base_year: f.scalar(TARGET_BASE_YEAR)? as u16,
                target_year: f.scalar(TARGET_YEAR)? as u16,
                base_tco2e: f.scalar(TARGET_BASE_TCO2E)?,
                reduction: f.scalar(TARGET_REDUCTION)? / 100.0,
            })
        })();
        targets.extend(own);
    }

    targets.sort_by_key(|t| t.target_year);
    if targets.len() > 2 {
        warn!(company = %m.company, targets = targets.len(), "more than two S1+2 targets, using the nearest two");
        targets.truncate(2);
    }
    targets
}

/// Targeted S1+2 emissions in `year`: the nearest target interpolated from
/// its base year, extended by an earlier-starting or later-ending second one.
pub fn sbti_targeted(targets: &[SbtiTarget], year: u16) -> Option<f64> {
    let main = targets.first()?;
    let mut points = vec![
        (f64::from(main.base_year), main.base_tco2e),
        (f64::from(main.target_year), main.targeted_tco2e()),
    ];
    if let Some(other) = targets.get(1) {
        if other.base_year < main.base_year {
            points.insert(0, (f64::from(other.base_year), other.base_tco2e));
        }
        if other.target_year > main.target_year {
            points.push((f64::from(other.target_year), other.targeted_tco2e()));
        }
    }
    let last = points.last()?.0;
    if f64::from(year) > last {
        return None;
    }
    interpolate(&points, f64::from(year))
}

/// Actual S1+2 in the target's scope: market-based falls back to
/// location-based Scope 2.
pub fn actual_s12(f: &dyn Figures, scope: Option<&str>, year: u16) -> Option<f64> {
    let s1 = f.value(S1, year)?;
    let s2 = match scope {
        Some("S1+2 LB") => f.value(S2_LB, year)?,
        _ => f.s2(year)?,
    };
    Some(s1 + s2)
}
