// src/schema/fields.rs
//
// The target schema: every field a company row carries. The extractor must
// produce exactly one value (possibly "not found") for each of these.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::{borrow::Cow, collections::HashMap, ops::RangeInclusive};

use super::types::{FieldKey, Unit, ValueKind};

/// Calendar years covered by the five questionnaire cycles (2016–2020).
pub const DATA_YEARS: RangeInclusive<u16> = 2015..=2019;

pub const S1: &str = "S1";
pub const S2_LB: &str = "S2 LB";
pub const S2_MB: &str = "S2 MB";

pub const SCOPE3_CATEGORIES: [&str; 17] = [
    "S3 C1",
    "S3 C2",
    "S3 C3",
    "S3 C4",
    "S3 C5",
    "S3 C6",
    "S3 C7",
    "S3 C8",
    "S3 C9",
    "S3 C10",
    "S3 C11",
    "S3 C12",
    "S3 C13",
    "S3 C14",
    "S3 C15",
    "S3 other (upstream)",
    "S3 other (downstream)",
];

pub const CR_FUEL: &str = "cr fuel";
pub const CNR_FUEL: &str = "cnr fuel";
pub const CT_FUEL: &str = "ct fuel";
pub const CR_ELECTRICITY: &str = "cr purchased electricity";
pub const CNR_ELECTRICITY: &str = "cnr purchased electricity";
pub const CT_ELECTRICITY: &str = "ct purchased electricity";
pub const CR_HSC: &str = "cr purchased hsc";
pub const CNR_HSC: &str = "cnr purchased hsc";
pub const CT_HSC: &str = "ct purchased hsc";
pub const CR_SELF_GEN: &str = "cr self-gen non-fuel";
pub const CR_ENERGY: &str = "cr energy";
pub const CNR_ENERGY: &str = "cnr energy";
pub const CT_ENERGY: &str = "ct energy";

pub const GT_GROSS_ELECTRICITY: &str = "gt gross electricity";
pub const GT_SELF_ELECTRICITY: &str = "gt self-cons electricity";
pub const GR_GROSS_ELECTRICITY: &str = "gr gross electricity";
pub const GR_SELF_ELECTRICITY: &str = "gr self-cons electricity";
pub const GT_GROSS_HSC: &str = "gt gross hsc";
pub const GT_SELF_HSC: &str = "gt self-cons hsc";
pub const GR_GROSS_HSC: &str = "gr gross hsc";
pub const GR_SELF_HSC: &str = "gr self-cons hsc";

/// Market-based Scope 2 instrument classes.
pub const SOURCING_INSTRUMENTS: [&str; 9] = [
    "ppa direct line",
    "ppa w/eac",
    "ppa no eac",
    "energy product w/eac",
    "energy product no eac",
    "unbundled eac",
    "hsc agreement",
    "grid mix",
    "self owned",
];

/// Low-carbon technology classes (modern questionnaires only).
pub const SOURCING_TECHNOLOGIES: [&str; 7] = [
    "solar",
    "wind",
    "hydro",
    "nuclear",
    "biomass",
    "other tech",
    "unspecified",
];

pub const S2MB_TOTAL: &str = "s2mb total";
pub const S2MB_UNCLASSIFIED: &str = "s2mb unclassified";

pub const REPORTING_YEARS: &str = "reporting years";
pub const REPORTING_YEAR: &str = "reporting year";
pub const REPORTING_START: &str = "reporting start";
pub const REPORTING_END: &str = "reporting end";

pub const BASE_SCOPES: [&str; 3] = [S1, S2_LB, S2_MB];

pub const METHODOLOGY: &str = "methodology";
pub const VERIFICATION: [&str; 3] = ["verification S1", "verification S2", "verification S3"];
pub const HEATING_VALUE: &str = "heating value";
pub const BIOFUEL_MWH: &str = "biofuel mwh";

pub const UTILITY: &str = "utility";
/// Generation technology groups of the utility module (C-EU8.2d).
pub const UTILITY_TECHNOLOGIES: [&str; 13] = [
    "coal",
    "lignite",
    "oil",
    "gas",
    "biomass",
    "waste",
    "nuclear",
    "geothermal",
    "hydro",
    "wind",
    "solar",
    "marine",
    "fossil ccs",
];
pub const UTILITY_MEASURES: [&str; 4] = ["capacity", "gross", "net", "emissions"];

pub const TARGET_SCOPE: &str = "target scope";
pub const TARGET_BASE_YEAR: &str = "target base year";
pub const TARGET_START_YEAR: &str = "target start year";
pub const TARGET_YEAR: &str = "target year";
pub const TARGET_BASE_TCO2E: &str = "target base tco2e";
pub const TARGET_REDUCTION: &str = "target reduction %";

pub fn base_year_metric(scope: &str) -> String {
    format!("base year {}", scope)
}

pub fn base_tco2e_metric(scope: &str) -> String {
    format!("base tco2e {}", scope)
}

pub fn sourcing_metric(class: &str) -> String {
    format!("s2mb {}", class)
}

pub fn utility_metric(measure: &str, technology: &str) -> String {
    format!("eu {} {}", measure, technology)
}

/// Which output table a metric ends up in after aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Reporting,
    Emissions,
    Consumption,
    Generation,
    Sourcing,
    Governance,
    Utility,
    Target,
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub name: Cow<'static, str>,
    pub kind: ValueKind,
    pub unit: Option<Unit>,
    pub group: Group,
    /// One field per data year when true, a single field otherwise.
    pub series: bool,
}

impl Metric {
    fn series(name: impl Into<Cow<'static, str>>, unit: Unit, group: Group) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Number,
            unit: Some(unit),
            group,
            series: true,
        }
    }

    fn number(name: impl Into<Cow<'static, str>>, unit: Unit, group: Group) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Number,
            unit: Some(unit),
            group,
            series: false,
        }
    }

    fn other(name: impl Into<Cow<'static, str>>, kind: ValueKind, group: Group) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: None,
            group,
            series: false,
        }
    }

    pub fn keys(&self) -> Vec<FieldKey> {
        if self.series {
            DATA_YEARS
                .map(|y| FieldKey::yearly(self.name.clone(), y))
                .collect()
        } else {
            vec![FieldKey::scalar(self.name.clone())]
        }
    }
}

pub struct Schema {
    metrics: Vec<Metric>,
    fields: Vec<FieldKey>,
    metric_index: HashMap<String, usize>,
    header_index: HashMap<String, usize>,
}

impl Schema {
    fn build(metrics: Vec<Metric>) -> Self {
        let metric_index = metrics
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.to_string(), i))
            .collect::<HashMap<_, _>>();
        debug_assert_eq!(metric_index.len(), metrics.len(), "duplicate metric name");

        let fields: Vec<FieldKey> = metrics.iter().flat_map(Metric::keys).collect();
        let header_index = fields
            .iter()
            .enumerate()
            .map(|(i, k)| (k.to_string(), i))
            .collect();

        Self {
            metrics,
            fields,
            metric_index,
            header_index,
        }
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// All field keys in sheet order.
    pub fn fields(&self) -> &[FieldKey] {
        &self.fields
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metric_index.get(name).map(|&i| &self.metrics[i])
    }

    pub fn metric_of(&self, key: &FieldKey) -> Option<&Metric> {
        self.metric(key.metric())
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        match self.metric_of(key) {
            Some(m) if m.series => key.year.map_or(false, |y| DATA_YEARS.contains(&y)),
            Some(_) => key.year.is_none(),
            None => false,
        }
    }

    /// Resolve a sheet header such as `S1 2019` back to its field key.
    pub fn field_by_header(&self, header: &str) -> Option<&FieldKey> {
        self.header_index.get(header).map(|&i| &self.fields[i])
    }
}

static SCHEMA: Lazy<Schema> = Lazy::new(|| {
    use Group::*;

    let mut metrics = vec![
        Metric::number(REPORTING_YEARS, Unit::Count, Reporting),
        Metric::number(REPORTING_YEAR, Unit::Year, Reporting),
        Metric::other(REPORTING_START, ValueKind::Text, Reporting),
        Metric::other(REPORTING_END, ValueKind::Text, Reporting),
    ];

    for scope in BASE_SCOPES {
        metrics.push(Metric::number(base_year_metric(scope), Unit::Year, Emissions));
        metrics.push(Metric::number(base_tco2e_metric(scope), Unit::TonnesCo2e, Emissions));
    }

    metrics.push(Metric::other(METHODOLOGY, ValueKind::Category, Governance));
    for name in VERIFICATION {
        metrics.push(Metric::other(name, ValueKind::Category, Governance));
    }

    metrics.extend([
        Metric::other(TARGET_SCOPE, ValueKind::Category, Target),
        Metric::number(TARGET_BASE_YEAR, Unit::Year, Target),
        Metric::number(TARGET_START_YEAR, Unit::Year, Target),
        Metric::number(TARGET_YEAR, Unit::Year, Target),
        Metric::number(TARGET_BASE_TCO2E, Unit::TonnesCo2e, Target),
        Metric::number(TARGET_REDUCTION, Unit::Percent, Target),
    ]);

    metrics.push(Metric::other(HEATING_VALUE, ValueKind::Category, Consumption));
    metrics.push(Metric::number(BIOFUEL_MWH, Unit::MegawattHours, Consumption));

    metrics.push(Metric::other(UTILITY, ValueKind::Flag, Utility));
    for tech in UTILITY_TECHNOLOGIES {
        metrics.push(Metric::number(utility_metric("capacity", tech), Unit::Megawatts, Utility));
        metrics.push(Metric::number(utility_metric("gross", tech), Unit::MegawattHours, Utility));
        metrics.push(Metric::number(utility_metric("net", tech), Unit::MegawattHours, Utility));
        metrics.push(Metric::number(utility_metric("emissions", tech), Unit::TonnesCo2e, Utility));
    }

    for name in [S1, S2_LB, S2_MB].into_iter().chain(SCOPE3_CATEGORIES) {
        metrics.push(Metric::series(name, Unit::TonnesCo2e, Emissions));
    }

    for name in [
        CR_FUEL,
        CNR_FUEL,
        CT_FUEL,
        CR_ELECTRICITY,
        CNR_ELECTRICITY,
        CT_ELECTRICITY,
        CR_HSC,
        CNR_HSC,
        CT_HSC,
        CR_SELF_GEN,
        CR_ENERGY,
        CNR_ENERGY,
        CT_ENERGY,
    ] {
        metrics.push(Metric::series(name, Unit::MegawattHours, Consumption));
    }

    for name in [
        GT_GROSS_ELECTRICITY,
        GT_SELF_ELECTRICITY,
        GR_GROSS_ELECTRICITY,
        GR_SELF_ELECTRICITY,
        GT_GROSS_HSC,
        GT_SELF_HSC,
        GR_GROSS_HSC,
        GR_SELF_HSC,
    ] {
        metrics.push(Metric::series(name, Unit::MegawattHours, Generation));
    }

    for class in SOURCING_INSTRUMENTS.iter().chain(SOURCING_TECHNOLOGIES.iter()) {
        metrics.push(Metric::series(sourcing_metric(class), Unit::MegawattHours, Sourcing));
    }
    metrics.push(Metric::series(S2MB_TOTAL, Unit::MegawattHours, Sourcing));
    metrics.push(Metric {
        name: S2MB_UNCLASSIFIED.into(),
        kind: ValueKind::Text,
        unit: None,
        group: Sourcing,
        series: true,
    });

    Schema::build(metrics)
});

/// The static target schema.
pub fn schema() -> &'static Schema {
    &SCHEMA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_metrics_expand_to_every_data_year() {
        let s = schema();
        for year in DATA_YEARS {
            assert!(s.contains(&FieldKey::yearly(S1, year)));
        }
        assert!(!s.contains(&FieldKey::yearly(S1, 2014)));
        assert!(!s.contains(&FieldKey::scalar(S1)));
        assert!(s.contains(&FieldKey::scalar(METHODOLOGY)));
    }

    #[test]
    fn headers_resolve_back_to_keys() {
        let s = schema();
        for key in s.fields() {
            assert_eq!(s.field_by_header(&key.to_string()), Some(key));
        }
        assert_eq!(s.fields().len(), s.header_index.len());
    }
}
