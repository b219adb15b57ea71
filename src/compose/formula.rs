// src/compose/formula.rs
//
// Spreadsheet formulas that re-derive each status from the row's own cells,
// so a hand-corrected value re-evaluates when the workbook is opened.

use crate::schema::{format_number, schema, FieldKey};
use crate::validate::rules::{single_field_rules, Check};
use crate::validate::{RuleInstance, Severity, Status};

use super::sheet::{cell_ref, column_letters, layout, FIRST_FIELD_COL, YEAR_COL};

/// Quote a string for use inside a formula.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `=IF(reject,"rejected",IF(flag,"flagged","accepted"))`, with empty
/// branches dropped.
fn verdict(rejects: &[String], flags: &[String]) -> String {
    fn any(conds: &[String]) -> String {
        match conds {
            [one] => one.clone(),
            many => format!("OR({})", many.join(",")),
        }
    }

    let mut f = quoted(Status::Accepted.as_str());
    if !flags.is_empty() {
        f = format!("IF({},{},{})", any(flags), quoted(Status::Flagged.as_str()), f);
    }
    if !rejects.is_empty() {
        f = format!("IF({},{},{})", any(rejects), quoted(Status::Rejected.as_str()), f);
    }
    format!("={}", f)
}

/// Status formula for one field's value cell on sheet row `row`.
pub fn field_status(key: &FieldKey, row: usize) -> String {
    let x = match layout().value_col(key) {
        Some(col) => cell_ref(col, row),
        None => return verdict(&[], &[]),
    };
    let year = format!("${}{}", column_letters(YEAR_COL), row);

    let mut rejects = Vec::new();
    let mut flags = Vec::new();

    for rule in single_field_rules() {
        let cond = match &rule.check {
            Check::NumericType(sel) if sel.matches(key) => Some(format!("AND({x}<>\"\",NOT(ISNUMBER({x})))")),
            Check::Range { fields, min, max } if fields.matches(key) => {
                let mut out = Vec::new();
                if min.is_finite() {
                    out.push(format!("{x}<{}", format_number(*min)));
                }
                if max.is_finite() {
                    out.push(format!("{x}>{}", format_number(*max)));
                }
                match out.len() {
                    0 => None,
                    1 => Some(format!("AND(ISNUMBER({x}),{})", out[0])),
                    _ => Some(format!("AND(ISNUMBER({x}),OR({}))", out.join(","))),
                }
            }
            Check::Vocabulary { fields, terms } if fields.matches(key) => {
                let array = terms.iter().map(|t| quoted(t)).collect::<Vec<_>>().join(",");
                Some(format!("AND({x}<>\"\",ISNA(MATCH({x},{{{array}}},0)))"))
            }
            Check::Required { metric } if key.metric() == *metric => match key.year {
                Some(y) => Some(format!("AND({year}={y},{x}=\"\")")),
                None => Some(format!("{x}=\"\"")),
            },
            Check::Absent { metric } if key.metric() == *metric => Some(format!("{x}<>\"\"")),
            _ => None,
        };
        if let Some(cond) = cond {
            match rule.severity {
                Severity::Reject => rejects.push(cond),
                Severity::Flag => flags.push(cond),
            }
        }
    }

    verdict(&rejects, &flags)
}

/// Status formula for one cross-field rule instance on sheet row `row`.
pub fn cross_status(inst: &RuleInstance, tolerance: f64, row: usize) -> String {
    let refs: Vec<String> = inst
        .fields
        .iter()
        .map(|k| {
            layout()
                .value_col(k)
                .map(|c| cell_ref(c, row))
                .unwrap_or_else(|| "\"\"".to_string())
        })
        .collect();
    let r = |i: usize| refs[i].as_str();
    let tol = format_number(tolerance);

    let cond = match &inst.rule.check {
        Check::YearOrder { strict, .. } => {
            let op = if *strict { "<=" } else { "<" };
            format!("AND(ISNUMBER({a}),ISNUMBER({b}),{b}{op}{a})", a = r(0), b = r(1))
        }
        Check::SumEquals { parts, .. } => {
            let p = refs[..parts.len()].join(",");
            let t = r(parts.len());
            format!("AND(ISNUMBER({t}),COUNT({p})>0,ABS(SUM({p})-{t})>{tol}*MAX(ABS({t}),1))")
        }
        Check::SumAtMost { parts, .. } => {
            let p = refs[..parts.len()].join(",");
            let t = r(parts.len());
            format!("AND(ISNUMBER({t}),SUM({p})>{t}*(1+{tol}))")
        }
        Check::AtLeast { .. } => {
            format!("AND(ISNUMBER({a}),ISNUMBER({b}),{a}<{b})", a = r(0), b = r(1))
        }
        Check::PairedPresence { .. } => format!("({}<>\"\")<>({}<>\"\")", r(0), r(1)),
        Check::ReportingYearMatchesCycle => {
            let year = cell_ref(YEAR_COL, row);
            format!("AND(ISNUMBER({a}),{a}<>{year})", a = r(0))
        }
        _ => return verdict(&[], &[]),
    };

    match inst.rule.severity {
        Severity::Reject => verdict(&[cond], &[]),
        Severity::Flag => verdict(&[], &[cond]),
    }
}

/// Overall company status: the worst status among the row's status cells.
pub fn overall_status(row: usize) -> String {
    let range = format!(
        "{}:{}",
        cell_ref(FIRST_FIELD_COL, row),
        cell_ref(layout().width() - 1, row)
    );
    format!(
        "=IF(COUNTIF({range},{r})>0,{r},IF(COUNTIF({range},{f})>0,{f},{a}))",
        r = quoted(Status::Rejected.as_str()),
        f = quoted(Status::Flagged.as_str()),
        a = quoted(Status::Accepted.as_str()),
    )
}

/// True when `key` has at least one single-field rule attached.
pub fn is_checked(key: &FieldKey) -> bool {
    schema().contains(key) && field_status(key, 2) != verdict(&[], &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fields::*;
    use crate::validate::rules::rule;

    fn col(key: &FieldKey, row: usize) -> String {
        cell_ref(layout().value_col(key).unwrap(), row)
    }

    #[test]
    fn emissions_status_checks_type_sign_and_ceiling() {
        let key = FieldKey::yearly(S1, 2019);
        let x = col(&key, 2);
        let f = field_status(&key, 2);
        assert!(f.starts_with("=IF(OR("), "{f}");
        assert!(f.contains(&format!("AND({x}<>\"\",NOT(ISNUMBER({x})))")));
        assert!(f.contains(&format!("AND(ISNUMBER({x}),{x}<0)")));
        assert!(f.contains(&format!("AND(ISNUMBER({x}),{x}>2000000000)")));
        assert!(f.contains(&format!("AND($C2=2019,{x}=\"\")")));
        assert!(f.ends_with(",\"flagged\",\"accepted\"))"));
    }

    #[test]
    fn vocabulary_terms_are_an_array_constant() {
        let key = FieldKey::scalar(METHODOLOGY);
        let f = field_status(&key, 7);
        assert!(f.contains("ISNA(MATCH("), "{f}");
        assert!(f.contains("\"GHG Protocol\""), "{f}");
        assert!(!f.contains("rejected"));
    }

    #[test]
    fn unchecked_field_is_always_accepted() {
        let key = FieldKey::scalar(REPORTING_END);
        assert_eq!(field_status(&key, 3), "=\"accepted\"");
        assert!(!is_checked(&key));
        assert!(is_checked(&FieldKey::scalar(TARGET_YEAR)));
    }

    #[test]
    fn cross_rules_become_if_formulas() {
        let r = rule("target-year-after-base-year").unwrap();
        let instances = r.instances();
        let inst = &instances[0];
        let f = cross_status(inst, 0.01, 4);
        let (base, target) = (col(&inst.fields[0], 4), col(&inst.fields[1], 4));
        assert_eq!(
            f,
            format!("=IF(AND(ISNUMBER({base}),ISNUMBER({target}),{target}<={base}),\"rejected\",\"accepted\")")
        );

        let r = rule("fuel-total-matches-parts").unwrap();
        let inst = r.instances().into_iter().find(|i| i.year == Some(2018)).unwrap();
        let f = cross_status(&inst, 0.01, 4);
        assert!(f.contains("ABS(SUM("), "{f}");
        assert!(f.contains("0.01*MAX(ABS("), "{f}");
        assert!(f.contains("\"flagged\""));
    }

    #[test]
    fn overall_counts_statuses_across_the_row() {
        let f = overall_status(2);
        assert!(f.starts_with("=IF(COUNTIF(D2:"), "{f}");
        assert!(f.contains("\"rejected\")>0"));
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(quoted("a \"b\""), "\"a \"\"b\"\"\"");
    }
}
