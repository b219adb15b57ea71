// src/load/role.rs
//
// Structural fingerprinting of questionnaire files. Filenames are not
// trusted; a document's role comes from the response container it carries
// and the cycle year in that container's title.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::fmt;

/// Questionnaire cycle a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Role {
    Cdp2016,
    Cdp2017,
    Cdp2018,
    Cdp2019,
    Cdp2020,
}

/// HTML template family. Legacy responses use `CCx.y` question codes inside
/// `ORSMENU_n` modules; modern ones address answers by element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layout {
    Legacy,
    Modern,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Cdp2016,
        Role::Cdp2017,
        Role::Cdp2018,
        Role::Cdp2019,
        Role::Cdp2020,
    ];

    pub fn cycle(self) -> u16 {
        match self {
            Role::Cdp2016 => 2016,
            Role::Cdp2017 => 2017,
            Role::Cdp2018 => 2018,
            Role::Cdp2019 => 2019,
            Role::Cdp2020 => 2020,
        }
    }

    /// Calendar year the cycle reports on.
    pub fn data_year(self) -> u16 {
        self.cycle() - 1
    }

    pub fn from_cycle(cycle: u16) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.cycle() == cycle)
    }

    pub fn layout(self) -> Layout {
        match self {
            Role::Cdp2016 | Role::Cdp2017 => Layout::Legacy,
            Role::Cdp2018 | Role::Cdp2019 | Role::Cdp2020 => Layout::Modern,
        }
    }

    pub fn is_legacy(self) -> bool {
        self.layout() == Layout::Legacy
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDP {}", self.cycle())
    }
}

/// Outcome of fingerprinting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Unique(Role),
    Ambiguous(Vec<Role>),
    Unrecognised,
}

pub const MODERN_CONTAINER: &str = "formatted_responses_ndp__container";
pub const LEGACY_CONTAINER: &str = "formatted_response__container";

static MODERN_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(&format!("#{}", MODERN_CONTAINER)).expect("static selector")
});
static LEGACY_SEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(&format!("#{}", LEGACY_CONTAINER)).expect("static selector")
});

/// Markers found in a document, before they are matched against roles.
#[derive(Debug, Default)]
struct Markers {
    modern_year: Option<u16>,
    legacy_year: Option<u16>,
}

fn title_text(container: ElementRef<'_>) -> Option<String> {
    container
        .children()
        .filter_map(ElementRef::wrap)
        .next()
        .map(|title| {
            title
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
}

fn trailing_year(segment: &str) -> Option<u16> {
    let segment = segment.trim();
    let start = segment.len().checked_sub(4)?;
    segment.get(start..)?.parse().ok()
}

fn markers(html: &Html) -> Markers {
    let modern_year = html
        .select(&MODERN_SEL)
        .next()
        .and_then(title_text)
        // "<Company> - Climate Change 2019": year closes the last segment
        .and_then(|t| t.rsplit(" - ").next().and_then(trailing_year));
    let legacy_year = html
        .select(&LEGACY_SEL)
        .next()
        .and_then(title_text)
        // "CDP Climate Change 2016 - Information Request": year closes the first
        .and_then(|t| t.split(" - ").next().and_then(trailing_year));
    Markers {
        modern_year,
        legacy_year,
    }
}

fn fingerprint_matches(role: Role, markers: &Markers) -> bool {
    let year = match role.layout() {
        Layout::Modern => markers.modern_year,
        Layout::Legacy => markers.legacy_year,
    };
    year == Some(role.cycle())
}

/// Assign a role to a parsed document. Pure; depends only on the tree.
pub fn detect_role(html: &Html) -> Detection {
    let markers = markers(html);
    let roles: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|&r| fingerprint_matches(r, &markers))
        .collect();
    match roles.len() {
        0 => Detection::Unrecognised,
        1 => Detection::Unique(roles[0]),
        _ => Detection::Ambiguous(roles),
    }
}
