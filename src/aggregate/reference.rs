// src/aggregate/reference.rs
//
// Typed views over the reference tables: the ranked company list and the
// RE100 / SBTi membership lists.

use serde::Serialize;
use std::{collections::BTreeMap, fmt};
use tracing::warn;

use super::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Initiative {
    #[serde(rename = "RE100")]
    Re100,
    #[serde(rename = "SBTi")]
    Sbti,
}

impl Initiative {
    pub const ALL: [Initiative; 2] = [Initiative::Re100, Initiative::Sbti];

    pub fn as_str(self) -> &'static str {
        match self {
            Initiative::Re100 => "RE100",
            Initiative::Sbti => "SBTi",
        }
    }

    /// Column prefix in the aggregated tables.
    pub fn prefix(self) -> &'static str {
        match self {
            Initiative::Re100 => "re100",
            Initiative::Sbti => "sbti",
        }
    }
}

impl fmt::Display for Initiative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ranked company list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInfo {
    pub name: String,
    pub rank: Option<u32>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub kind: Option<String>,
    pub revenue: Option<f64>,
}

impl CompanyInfo {
    pub const COLUMNS: [&'static str; 6] = ["rank", "country", "sector", "industry", "type", "revenue"];

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.rank.map(|r| r.to_string()).unwrap_or_default(),
            self.country.clone().unwrap_or_default(),
            self.sector.clone().unwrap_or_default(),
            self.industry.clone().unwrap_or_default(),
            self.kind.clone().unwrap_or_default(),
            self.revenue.map(crate::schema::format_number).unwrap_or_default(),
        ]
    }

    /// Power and gas utilities by their reference industry.
    pub fn is_utility(&self) -> bool {
        self.industry
            .as_deref()
            .map(|i| i.to_lowercase().contains("utilit"))
            .unwrap_or(false)
    }
}

/// Membership of one company in one initiative, with the initiative's own
/// target columns kept by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub company: String,
    pub initiative: Initiative,
    pub member: bool,
    pub joining_year: Option<u16>,
    pub status: Option<String>,
    extra: BTreeMap<String, String>,
}

impl Membership {
    pub const COLUMNS: [&'static str; 3] = ["member", "joining year", "status"];

    pub fn cells(&self) -> Vec<String> {
        vec![
            if self.member { "yes" } else { "no" }.to_string(),
            self.joining_year.map(|y| y.to_string()).unwrap_or_default(),
            self.status.clone().unwrap_or_default(),
        ]
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.extra.get(&column.to_lowercase()).map(String::as_str)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.text(column).and_then(parse_number)
    }

    pub fn year(&self, column: &str) -> Option<u16> {
        self.text(column).and_then(parse_year)
    }

    /// A ratio column: fractions as given, percentages scaled down.
    pub fn ratio(&self, column: &str) -> Option<f64> {
        self.number(column).map(|r| if r > 1.0 { r / 100.0 } else { r })
    }
}

/// Everything the aggregator joins against.
#[derive(Debug, Clone, Default)]
pub struct References {
    pub companies: BTreeMap<String, CompanyInfo>,
    pub memberships: BTreeMap<(Initiative, String), Membership>,
}

impl References {
    pub fn new(companies: &Table, re100: &Table, sbti: &Table) -> Self {
        let mut refs = References {
            companies: company_list(companies),
            memberships: BTreeMap::new(),
        };
        for (initiative, table) in [(Initiative::Re100, re100), (Initiative::Sbti, sbti)] {
            for m in membership_list(initiative, table) {
                refs.memberships.insert((initiative, m.company.clone()), m);
            }
        }
        refs
    }

    pub fn membership(&self, initiative: Initiative, company: &str) -> Option<&Membership> {
        self.memberships.get(&(initiative, company.to_string()))
    }

    pub fn members(&self, initiative: Initiative) -> impl Iterator<Item = &Membership> {
        self.memberships
            .values()
            .filter(move |m| m.initiative == initiative && m.member)
    }
}

/// The company key column: `name`, falling back to `company`.
fn key_of<'a>(table: &Table, row: &'a [String]) -> Option<&'a str> {
    table.get(row, "name").or_else(|| table.get(row, "company"))
}

pub fn company_list(table: &Table) -> BTreeMap<String, CompanyInfo> {
    let mut out = BTreeMap::new();
    for row in table.rows() {
        let Some(name) = key_of(table, row) else {
            warn!("company list row without a name, skipped");
            continue;
        };
        let text = |col: &str| table.get(row, col).map(str::to_string);
        let info = CompanyInfo {
            name: name.to_string(),
            rank: table.get(row, "rank").and_then(|r| r.parse().ok()),
            country: text("country"),
            sector: text("sector"),
            industry: text("industry"),
            kind: text("type"),
            revenue: table.get(row, "revenue").and_then(parse_number),
        };
        if out.insert(name.to_string(), info).is_some() {
            warn!(company = name, "company listed twice in the reference list, last row kept");
        }
    }
    out
}

pub fn membership_list(initiative: Initiative, table: &Table) -> Vec<Membership> {
    let fixed = ["name", "company", "member", "joining year", "status"];
    table
        .rows()
        .iter()
        .filter_map(|row| {
            let company = key_of(table, row)?;
            let extra = table
                .header()
                .iter()
                .filter(|h| !fixed.contains(&h.trim().to_lowercase().as_str()))
                .filter_map(|h| table.get(row, h).map(|v| (h.trim().to_lowercase(), v.to_string())))
                .collect();
            Some(Membership {
                company: company.to_string(),
                initiative,
                member: table
                    .get(row, "member")
                    .map(|m| matches!(m.to_lowercase().as_str(), "yes" | "y" | "true" | "1"))
                    .unwrap_or(false),
                joining_year: table.get(row, "joining year").and_then(parse_year),
                status: table.get(row, "status").map(str::to_string),
                extra,
            })
        })
        .collect()
}

/// Numbers as they appear in hand-kept sheets: thousands separators, a
/// trailing `%`, `2019.0`.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().trim_end_matches('%').replace(',', "").trim().parse().ok()
}

/// A calendar year between 1900 and 2100; anything else is treated as blank.
pub fn parse_year(s: &str) -> Option<u16> {
    parse_number(s).filter(|y| (1900.0..=2100.0).contains(y)).map(|y| y as u16)
}
