// src/extract/energy.rs
//
// Energy consumption (C8.2a / CC11.2, CC11.3, CC11.5), generation
// (C8.2d / CC11.5) and biofuels (C8.2c).

use tracing::warn;

use super::units::{parse_quantity, Quantity};
use super::{vocab, Context, RoleFields};
use crate::error::UnitParseError;
use crate::load::{Layout, QuestionnaireDocument};
use crate::schema::fields::*;
use crate::schema::{FieldKey, Unit};

const LEGACY_MODULE: &str = "ORSMENU_3";
const CONSUMPTION_GRID: &str = "formatted_responses_matrix_set_grid_10823";
const GENERATION_GRID: &str = "formatted_responses_matrix_set_grid_11555";
const FUELS_QUESTION: &str = "formatted_responses_question_10853";

const FUEL_ROW: &str = "Consumption of fuel (excluding feedstock)";
const SELF_GEN_ROW: &str = "Consumption of self-generated non-fuel renewable energy";

/// C8.2a rows and the (renewable, non-renewable, total) metrics they feed.
const CONSUMPTION_ROWS: [(&str, [&str; 3]); 6] = [
    (FUEL_ROW, [CR_FUEL, CNR_FUEL, CT_FUEL]),
    (
        "Consumption of purchased or acquired electricity",
        [CR_ELECTRICITY, CNR_ELECTRICITY, CT_ELECTRICITY],
    ),
    ("Consumption of purchased or acquired heat", [CR_HSC, CNR_HSC, CT_HSC]),
    ("Consumption of purchased or acquired steam", [CR_HSC, CNR_HSC, CT_HSC]),
    ("Consumption of purchased or acquired cooling", [CR_HSC, CNR_HSC, CT_HSC]),
    ("Total energy consumption", [CR_ENERGY, CNR_ENERGY, CT_ENERGY]),
];

/// C8.2d columns: total gross, total self-consumed, renewable gross,
/// renewable self-consumed.
const ELECTRICITY_GENERATION: [&str; 4] = [
    GT_GROSS_ELECTRICITY,
    GT_SELF_ELECTRICITY,
    GR_GROSS_ELECTRICITY,
    GR_SELF_ELECTRICITY,
];
const HSC_GENERATION: [&str; 4] = [GT_GROSS_HSC, GT_SELF_HSC, GR_GROSS_HSC, GR_SELF_HSC];

pub(super) fn extract(
    doc: &QuestionnaireDocument,
    _ctx: &Context,
    out: &mut RoleFields,
) -> Result<(), UnitParseError> {
    match doc.layout() {
        Layout::Modern => {
            consumption_modern(doc, out)?;
            generation_modern(doc, out)?;
        }
        Layout::Legacy => legacy(doc, out)?,
    }
    Ok(())
}

fn consumption_modern(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(table) = doc.section(CONSUMPTION_GRID).and_then(|s| s.default_table()) else {
        warn!(role = %doc.role(), "C8.2a energy consumption grid missing");
        return Ok(());
    };
    let year = out.data_year();

    for row in &table.rows {
        let Some(label) = row.first() else { continue };

        if label == SELF_GEN_ROW {
            // only the total column is meaningful
            if let Some(raw) = row.get(4) {
                out.add_number(FieldKey::yearly(CR_SELF_GEN, year), raw, Some("MWh"), out.source("C8.2a", label))?;
            }
            continue;
        }

        let Some((_, metrics)) = CONSUMPTION_ROWS.iter().find(|(l, _)| l == label) else {
            warn!(role = %doc.role(), row = %label, "C8.2a unexpected row");
            continue;
        };
        for (metric, raw) in metrics.iter().zip(row.iter().skip(2)) {
            out.add_number(FieldKey::yearly(*metric, year), raw, Some("MWh"), out.source("C8.2a", label))?;
        }

        if label == FUEL_ROW {
            if let Some(hv) = row.get(1) {
                let source = out.source("C8.2a", "Heating value");
                out.category(FieldKey::scalar(HEATING_VALUE), vocab::HEATING_VALUE, hv, source);
            }
            biofuels(doc, out)?;
        }
    }
    Ok(())
}

/// C8.2c: sum of MWh over fuels that are biomass. Only a cross-check of the
/// renewable fuel figure; companies often leave this section blank.
fn biofuels(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(q) = doc.section(FUELS_QUESTION) else { return Ok(()) };
    let texts = q.texts();
    let mut bio = false;
    let mut total = 0.0;
    let mut raws = Vec::new();

    for (i, txt) in texts.iter().enumerate() {
        let next = texts.get(i + 1).map(String::as_str).unwrap_or("");
        if txt == "Fuels (excluding feedstocks)" {
            bio = vocab::BIOMASS_FUELS.contains(&next);
        } else if bio && txt == "Total fuel MWh consumed by the organization" {
            if let Ok(Quantity::Number(n)) =
                parse_quantity(BIOFUEL_MWH, next, Unit::MegawattHours, Some("MWh"))
            {
                total += n;
                raws.push(next.to_string());
            }
        }
    }

    let renewable_fuel = out
        .get(&FieldKey::yearly(CR_FUEL, out.data_year()))
        .and_then(|v| v.number());
    if let Some(cr) = renewable_fuel {
        if total > cr {
            warn!(role = %doc.role(), biofuel = total, renewable_fuel = cr, "C8.2c biofuels exceed renewable fuel in C8.2a");
        }
    }

    if !raws.is_empty() {
        let key = FieldKey::scalar(BIOFUEL_MWH);
        let source = out.source("C8.2c", "Total fuel MWh consumed by the organization");
        out.accumulate(key, total, &raws.join(" + "), source);
    }
    Ok(())
}

fn generation_modern(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let Some(table) = doc.section(GENERATION_GRID).and_then(|s| s.default_table()) else {
        // optional section
        return Ok(());
    };
    let year = out.data_year();

    for row in &table.rows {
        let Some(label) = row.first() else { continue };
        let metrics = match label.as_str() {
            "Electricity" => &ELECTRICITY_GENERATION,
            "Heat" | "Steam" | "Cooling" => &HSC_GENERATION,
            other => {
                warn!(role = %doc.role(), row = other, "C8.2d unexpected energy type");
                continue;
            }
        };
        for (metric, raw) in metrics.iter().zip(row.iter().skip(1)) {
            out.add_number(FieldKey::yearly(*metric, year), raw, Some("MWh"), out.source("C8.2d", label))?;
        }
    }
    Ok(())
}

fn legacy(doc: &QuestionnaireDocument, out: &mut RoleFields) -> Result<(), UnitParseError> {
    let year = out.data_year();

    // CC11.2: purchased heat, steam and cooling, MWh in the second column
    if let Some(table) = doc
        .legacy_question(LEGACY_MODULE, "CC11.2")
        .and_then(|q| q.default_table())
    {
        for row in &table.rows {
            let label = row.first().map(String::as_str).unwrap_or("");
            if let Some(raw) = row.get(1) {
                out.add_number(FieldKey::yearly(CT_HSC, year), raw, Some("MWh"), out.source("CC11.2", label))?;
            }
        }
    }

    // CC11.3: total fuel consumed, free text answer
    if let Some(q) = doc.legacy_question(LEGACY_MODULE, "CC11.3") {
        let texts = q.texts();
        let raw = texts.get(2).map(String::as_str).unwrap_or("");
        if !out.number(FieldKey::yearly(CT_FUEL, year), raw, Some("MWh"), out.source("CC11.3", ""))? {
            warn!(role = %doc.role(), "CC11.3 total fuel consumption empty");
        }
    }

    // CC11.5: total consumed, purchased, produced, renewable produced,
    // renewable produced and consumed
    if let Some(row) = doc
        .legacy_question(LEGACY_MODULE, "CC11.5")
        .and_then(|q| q.default_table())
        .and_then(|t| t.rows.into_iter().next())
    {
        let cells: [(&str, &str); 4] = [
            (CT_ELECTRICITY, "purchased"),
            (GT_GROSS_ELECTRICITY, "produced"),
            (GR_GROSS_ELECTRICITY, "renewable produced"),
            (GR_SELF_ELECTRICITY, "renewable produced and consumed"),
        ];
        for (i, (metric, label)) in cells.into_iter().enumerate() {
            if let Some(raw) = row.get(i + 1) {
                out.number(FieldKey::yearly(metric, year), raw, Some("MWh"), out.source("CC11.5", label))?;
            }
        }
        if let Some(total) = row.first() {
            let total = parse_quantity("CC11.5 total", total, Unit::MegawattHours, Some("MWh"))?;
            let purchased = out.get(&FieldKey::yearly(CT_ELECTRICITY, year)).and_then(|v| v.number());
            if let (Quantity::Number(total), Some(purchased)) = (total, purchased) {
                if total < purchased {
                    warn!(role = %doc.role(), total, purchased, "CC11.5 total consumption below purchased electricity");
                }
            }
        }
    }
    Ok(())
}
