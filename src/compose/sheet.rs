// src/compose/sheet.rs
//
// Column layout of the consolidated workbook sheet:
//
//   A company | B status | C reporting year | per field: value, status | per
//   cross-field rule instance: one status column

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::schema::{schema, FieldKey};
use crate::validate::{cross_field_instances, RuleInstance};

pub const COMPANY_COL: usize = 0;
pub const STATUS_COL: usize = 1;
pub const YEAR_COL: usize = 2;
pub const FIRST_FIELD_COL: usize = 3;

pub struct SheetLayout {
    header: Vec<String>,
    value_cols: HashMap<FieldKey, usize>,
    first_rule_col: usize,
}

impl SheetLayout {
    fn build() -> Self {
        let mut header = vec![
            "company".to_string(),
            "status".to_string(),
            "reporting year".to_string(),
        ];
        let mut value_cols = HashMap::new();
        for key in schema().fields() {
            value_cols.insert(key.clone(), header.len());
            header.push(key.to_string());
            header.push(format!("{} status", key));
        }
        let first_rule_col = header.len();
        header.extend(cross_field_instances().iter().map(RuleInstance::name));

        Self {
            header,
            value_cols,
            first_rule_col,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn value_col(&self, key: &FieldKey) -> Option<usize> {
        self.value_cols.get(key).copied()
    }

    pub fn status_col(&self, key: &FieldKey) -> Option<usize> {
        self.value_col(key).map(|c| c + 1)
    }

    /// Column of the i-th cross-field rule instance.
    pub fn rule_col(&self, i: usize) -> usize {
        self.first_rule_col + i
    }
}

static LAYOUT: Lazy<SheetLayout> = Lazy::new(SheetLayout::build);

pub fn layout() -> &'static SheetLayout {
    &LAYOUT
}

/// Spreadsheet column letters for a 0-based index: 0 → A, 26 → AA.
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A1-style reference, `row` 1-based.
pub fn cell_ref(col: usize, row: usize) -> String {
    format!("{}{}", column_letters(col), row)
}
