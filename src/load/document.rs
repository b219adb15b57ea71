// src/load/document.rs

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::role::{Layout, Role};

/// Table class used by modern response grids.
pub const MODERN_TABLE: &str = "ndp_formatted_response__table";
/// Table class used by legacy question bodies.
pub const LEGACY_TABLE: &str = "cdp-question-body-table";

/// One parsed questionnaire file with its detected role.
pub struct QuestionnaireDocument {
    role: Role,
    company: String,
    path: PathBuf,
    html: Html,
}

impl QuestionnaireDocument {
    pub fn new(role: Role, company: impl Into<String>, path: impl Into<PathBuf>, html: Html) -> Self {
        Self {
            role,
            company: company.into(),
            path: path.into(),
            html,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn layout(&self) -> Layout {
        self.role.layout()
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Modern answer block by element id, e.g. `formatted_responses_question_18615`.
    pub fn section(&self, id: &str) -> Option<Section<'_>> {
        let selector = Selector::parse(&format!("#{}", id)).ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| Section::new(el, self.layout()))
    }

    /// Legacy question by code (`CC8.2`) inside a module (`ORSMENU_3`).
    /// Questions are the children of a `cdp-page-body`; pages may be nested
    /// inside one another, so every page body of the module is searched.
    pub fn legacy_question(&self, module_id: &str, code: &str) -> Option<Section<'_>> {
        let module = self.section(module_id)?;
        module
            .element()
            .select(&PAGE_BODY)
            .flat_map(|body| body.children().filter_map(ElementRef::wrap))
            .find(|q| first_text(*q).map_or(false, |t| starts_with_code(&t, code)))
            .map(|el| Section::new(el, self.layout()))
    }

    /// Modern question block whose heading starts with `code`, e.g. `C4.1a`.
    pub fn section_by_heading(&self, code: &str) -> Option<Section<'_>> {
        self.html
            .select(&MODERN_QUESTION)
            .find(|q| first_text(*q).map_or(false, |t| starts_with_code(&t, code)))
            .map(|el| Section::new(el, self.layout()))
    }
}

static PAGE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.cdp-page-body").expect("static selector"));
static MODERN_QUESTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[id^="formatted_responses_question_"]"#).expect("static selector")
});

/// True when `text` opens with the question code as a whole token, so
/// `CC8.2` does not match `CC8.2a`.
fn starts_with_code(text: &str, code: &str) -> bool {
    match text.trim_start().strip_prefix(code) {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric() && c != '.'),
        None => false,
    }
}

fn first_text(el: ElementRef<'_>) -> Option<String> {
    el.text().map(clean).find(|t| !t.is_empty())
}

/// Cell text with line breaks and zero-width spaces removed.
fn clean(text: &str) -> String {
    text.replace(['\n', '\r', '\u{200b}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// A navigable piece of a questionnaire.
#[derive(Clone, Copy)]
pub struct Section<'a> {
    el: ElementRef<'a>,
    layout: Layout,
}

impl<'a> Section<'a> {
    fn new(el: ElementRef<'a>, layout: Layout) -> Self {
        Self { el, layout }
    }

    pub fn element(&self) -> ElementRef<'a> {
        self.el
    }

    /// Every non-empty text node in document order, cleaned.
    pub fn texts(&self) -> Vec<String> {
        self.el
            .text()
            .map(clean)
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Text following the first occurrence of `label`.
    pub fn value_after(&self, label: &str) -> Option<String> {
        let texts = self.texts();
        texts
            .iter()
            .position(|t| t == label)
            .and_then(|i| texts.get(i + 1).cloned())
    }

    /// The section's first table of class `class` as a header + body matrix.
    pub fn table(&self, class: &str) -> Option<Matrix> {
        let selector = Selector::parse(&format!("table.{}", class)).ok()?;
        let table = self.el.select(&selector).next()?;
        Matrix::from_table(table, self.layout)
    }

    /// Table with the layout's default class.
    pub fn default_table(&self) -> Option<Matrix> {
        match self.layout {
            Layout::Modern => self.table(MODERN_TABLE),
            Layout::Legacy => self.table(LEGACY_TABLE),
        }
    }
}

/// Header row plus body rows of a questionnaire table.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Matrix {
    fn from_table(table: ElementRef<'_>, layout: Layout) -> Option<Self> {
        let th = Selector::parse("thead th").ok()?;
        let td = Selector::parse("tbody td").ok()?;

        let header: Vec<String> = table.select(&th).map(|c| cell_text(c, layout)).collect();
        let cells: Vec<String> = table.select(&td).map(|c| cell_text(c, layout)).collect();

        if header.is_empty() {
            warn!("table without header cells");
            return None;
        }
        if cells.len() % header.len() != 0 {
            warn!(
                header = header.len(),
                cells = cells.len(),
                "table dimensions do not match"
            );
            return None;
        }

        let rows = cells.chunks(header.len()).map(|c| c.to_vec()).collect();
        Some(Self { header, rows })
    }

    pub fn row(&self, label: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|r| r.first().map_or(false, |c| c == label))
            .map(Vec::as_slice)
    }
}

fn cell_text(cell: ElementRef<'_>, layout: Layout) -> String {
    match layout {
        // legacy cells wrap their content in one extra element
        Layout::Legacy => cell
            .children()
            .filter_map(ElementRef::wrap)
            .next()
            .map(|inner| clean(&inner.text().collect::<String>()))
            .unwrap_or_else(|| clean(&cell.text().collect::<String>())),
        Layout::Modern => clean(&cell.text().collect::<String>()),
    }
}
