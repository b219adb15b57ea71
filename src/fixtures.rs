// src/fixtures.rs
//
// Crafted questionnaires for tests. Each builder renders one cycle's HTML in
// the layout of that cycle, filled with a consistent set of answers for a
// fictional company.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::extract::extract_company;
use crate::load::{load_company, CompanyIndex, Layout, Role};
use crate::schema::CompanyRecord;
use crate::validate::Validator;

/// Index that knows no company.
pub struct EmptyIndex;

impl CompanyIndex for EmptyIndex {
    fn contains(&self, _company: &str) -> bool {
        false
    }
    fn location(&self) -> &Path {
        Path::new("")
    }
}

pub struct Questionnaire {
    role: Role,
    company: String,
    scope1: Vec<String>,
    scope2: Vec<(String, String)>,
    target: Option<(u16, u16)>,
    utility: bool,
}

impl Questionnaire {
    pub fn new(role: Role) -> Self {
        let (scope1, scope2): (Vec<&str>, Vec<(&str, &str)>) = match role {
            Role::Cdp2020 => (vec!["900", "1100"], vec![("500", "400"), ("520", "410")]),
            Role::Cdp2019 => (vec!["1000"], vec![("520", "420")]),
            Role::Cdp2018 => (vec!["1150"], vec![("540", "440")]),
            Role::Cdp2017 => (vec!["1200"], vec![("550", "450")]),
            Role::Cdp2016 => (vec!["1300"], vec![("560", "460")]),
        };
        Self {
            role,
            company: "Acme Corp".to_string(),
            scope1: scope1.into_iter().map(String::from).collect(),
            scope2: scope2
                .into_iter()
                .map(|(l, m)| (l.to_string(), m.to_string()))
                .collect(),
            target: Some((2015, 2030)),
            utility: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn company(&mut self, name: &str) -> &mut Self {
        self.company = name.to_string();
        self
    }

    /// Scope 1 answers, reporting year first.
    pub fn scope1(&mut self, values: &[&str]) -> &mut Self {
        self.scope1 = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn target(&mut self, base_year: u16, target_year: u16) -> &mut Self {
        self.target = Some((base_year, target_year));
        self
    }

    pub fn utility(&mut self, on: bool) -> &mut Self {
        self.utility = on;
        self
    }

    pub fn render(&self) -> String {
        let body = match self.role.layout() {
            Layout::Modern => self.modern(),
            Layout::Legacy => self.legacy(),
        };
        format!("<!DOCTYPE html>\n<html><head><title>CDP</title></head><body>\n{}\n</body></html>\n", body)
    }

    fn modern(&self) -> String {
        let cycle = self.role.cycle();
        let year = self.role.data_year();
        let n_prior = self.scope1.len().saturating_sub(1);
        let mut html = format!(
            "<div id=\"formatted_responses_ndp__container\">\n<h1>{} - Climate Change {}</h1>\n",
            esc(&self.company),
            cycle
        );

        // C0.2 reporting period
        let (past, count) = if n_prior > 0 {
            ("Yes".to_string(), format!("{} year", n_prior))
        } else {
            ("No".to_string(), "<Not Applicable>".to_string())
        };
        html += &section(
            "formatted_responses_matrix_set_grid_11995",
            "C0.2",
            &table(
                Layout::Modern,
                &[
                    "",
                    "Start date",
                    "End date",
                    "Indicate if you are providing emissions data for past reporting years",
                    "Select the number of past reporting years you will be providing emissions data for",
                ],
                &[vec![
                    "Reporting year".to_string(),
                    format!("January 1 {}", year),
                    format!("December 31 {}", year),
                    past,
                    count,
                ]],
            ),
        );

        // C5.1 base year
        for (id, scope, amount) in [
            ("2723", "Scope 1", "1300"),
            ("2727", "Scope 2 (location-based)", "560"),
            ("2731", "Scope 2 (market-based)", "480"),
        ] {
            html += &section(
                &format!("formatted_responses_question_{}", id),
                scope,
                &pairs(&[
                    ("Base year start", "January 1 2015"),
                    ("Base year end", "December 31 2015"),
                    ("Base year emissions (metric tons CO2e)", amount),
                ]),
            );
        }

        html += &section(
            "formatted_responses_question_12033",
            "C5.2",
            "<p>The Greenhouse Gas Protocol: A Corporate Accounting and Reporting Standard (Revised Edition)</p>",
        );

        // C6.1 / C6.3, one block per reported year
        let mut s1 = String::new();
        for (i, value) in self.scope1.iter().enumerate() {
            let y = year - i as u16;
            s1 += &format!("<h5>{}</h5>", if i == 0 { "Reporting year".to_string() } else { format!("Past year {}", i) });
            s1 += &pairs(&[
                ("Gross global Scope 1 emissions (metric tons CO2e)", value.as_str()),
                ("Start date", format!("January 1 {}", y).as_str()),
                ("End date", format!("December 31 {}", y).as_str()),
            ]);
        }
        html += &section("formatted_responses_question_18615", "C6.1", &s1);

        let mut s2 = String::new();
        for (i, (lb, mb)) in self.scope2.iter().enumerate() {
            let y = year - i as u16;
            s2 += &pairs(&[
                ("Scope 2, location-based", lb.as_str()),
                ("Scope 2, market-based (if applicable)", mb.as_str()),
                ("Start date", format!("January 1 {}", y).as_str()),
                ("End date", format!("December 31 {}", y).as_str()),
            ]);
        }
        html += &section("formatted_responses_question_2816", "C6.3", &s2);

        html += &section(
            "formatted_responses_question_2325",
            "C6.5",
            &pairs(&[
                ("Purchased goods and services", ""),
                ("Evaluation status", "Relevant, calculated"),
                ("Metric tonnes CO2e", "5,000"),
                ("Capital goods", ""),
                ("Evaluation status", "Not relevant, explanation provided"),
                ("Metric tonnes CO2e", "<Not Applicable>"),
                ("Business travel", ""),
                ("Evaluation status", "Relevant, calculated"),
                ("Metric tonnes CO2e", "250"),
            ]),
        );

        // C10.1 verification
        html += &section(
            "formatted_responses_matrix_set_grid_11582",
            "C10.1",
            &table(
                Layout::Modern,
                &["Scope", "Verification/assurance status"],
                &[
                    row(&["Scope 1", "Third-party verification or assurance process in place"]),
                    row(&[
                        "Scope 2 (location-based or market-based)",
                        "Third-party verification or assurance process in place",
                    ]),
                    row(&["Scope 3", "No third-party verification or assurance"]),
                ],
            ),
        );

        // C8.2a consumption: renewable, non-renewable, total
        html += &section(
            "formatted_responses_matrix_set_grid_10823",
            "C8.2a",
            &table(
                Layout::Modern,
                &[
                    "Activity",
                    "Heating value",
                    "MWh from renewable sources",
                    "MWh from non-renewable sources",
                    "Total (renewable and non-renewable) MWh",
                ],
                &[
                    row(&["Consumption of fuel (excluding feedstock)", "HHV (higher heating value)", "100", "2400", "2500"]),
                    row(&["Consumption of purchased or acquired electricity", "<Not Applicable>", "300", "700", "1000"]),
                    row(&["Consumption of purchased or acquired heat", "<Not Applicable>", "0", "50", "50"]),
                    row(&["Consumption of purchased or acquired steam", "<Not Applicable>", "0", "0", "0"]),
                    row(&["Consumption of purchased or acquired cooling", "<Not Applicable>", "0", "10", "10"]),
                    row(&[
                        "Consumption of self-generated non-fuel renewable energy",
                        "<Not Applicable>",
                        "<Not Applicable>",
                        "<Not Applicable>",
                        "40",
                    ]),
                    row(&["Total energy consumption", "<Not Applicable>", "440", "3160", "3600"]),
                ],
            ),
        );

        html += &section(
            "formatted_responses_question_10853",
            "C8.2c",
            &pairs(&[
                ("Fuels (excluding feedstocks)", "Wood Pellets"),
                ("Total fuel MWh consumed by the organization", "80"),
                ("Fuels (excluding feedstocks)", "Natural Gas"),
                ("Total fuel MWh consumed by the organization", "2400"),
            ]),
        );

        html += &section(
            "formatted_responses_matrix_set_grid_11555",
            "C8.2d",
            &table(
                Layout::Modern,
                &[
                    "Energy carrier",
                    "Total Gross generation (MWh)",
                    "Generation that is consumed by the organization (MWh)",
                    "Gross generation from renewable sources (MWh)",
                    "Generation from renewable sources that is consumed by the organization (MWh)",
                ],
                &[row(&["Electricity", "200", "150", "120", "100"]), row(&["Heat", "0", "0", "0", "0"])],
            ),
        );

        // C8.2e sourcing: two rows, the first split over two technologies
        html += &section(
            "formatted_responses_question_11576",
            "C8.2e",
            &format!(
                "{}<p>Low-carbon technology type</p><ul><li>Wind</li><li>Solar</li></ul>{}{}<p>Low-carbon technology type</p><ul><li>Hydropower</li></ul>{}",
                pairs(&[("Sourcing method", "Energy attribute certificates, Guarantees of Origin")]),
                pairs(&[
                    ("Region of consumption of low-carbon electricity, heat, steam or cooling", "Europe"),
                    ("MWh consumed accounted for at a zero emission factor", "200"),
                ]),
                pairs(&[(
                    "Sourcing method",
                    "Power purchase agreement (PPA) with a grid-connected generator with energy attribute certificates",
                )]),
                pairs(&[
                    ("Region of consumption of low-carbon electricity, heat, steam or cooling", "Europe"),
                    ("MWh consumed accounted for at a zero emission factor", "100"),
                ]),
            ),
        );

        if self.utility {
            html += &section(
                "formatted_responses_question_8602",
                "C-EU8.2d",
                &pairs(&[
                    ("Coal – hard", ""),
                    ("Nameplate capacity (MW)", "100"),
                    ("Gross electricity generation (GWh)", "0.5"),
                    ("Net electricity generation (GWh)", "0.45"),
                    ("Absolute scope 1 emissions (metric tons CO2e)", "400"),
                    ("Scope 1 emissions intensity (metric tons CO2e per GWh)", "800"),
                ]),
            );
        }

        if let Some((base, target)) = self.target {
            html += &section(
                "formatted_responses_question_7834",
                "C4.1a",
                &pairs(&[
                    ("Target reference number", "Abs 1"),
                    ("Scope", "Scope 1+2 (market-based)"),
                    ("Base year", base.to_string().as_str()),
                    ("Start year", base.max(2016).to_string().as_str()),
                    ("Base year emissions covered by target (metric tons CO2e)", "1780"),
                    ("Target year", target.to_string().as_str()),
                    ("Targeted % reduction from base year", "30"),
                ]),
            );
        }

        html += "</div>";
        html
    }

    fn legacy(&self) -> String {
        let cycle = self.role.cycle();
        let year = i32::from(self.role.data_year());
        let start = chrono::NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.format("%a %d %b %Y").to_string());
        let end = chrono::NaiveDate::from_ymd_opt(year, 12, 31).map(|d| d.format("%a %d %b %Y").to_string());
        let period = format!("{} - {}", start.unwrap_or_default(), end.unwrap_or_default());

        let mut html = format!(
            "<div id=\"formatted_response__container\">\n<h1>CDP Climate Change {} - Information Request</h1>\n<h2>{}</h2>\n",
            cycle,
            esc(&self.company)
        );

        html += &module(
            "ORSMENU_0",
            "Page: CC0. Introduction",
            &[question(
                "CC0.2",
                "Please state the start and end date of the year for which you are reporting data",
                &table(Layout::Legacy, &["Enter Periods that will be used for reporting"], &[vec![period]]),
            )],
        );

        let (lb, mb) = self.scope2.first().cloned().unwrap_or_default();
        let s1 = self.scope1.first().cloned().unwrap_or_default();
        let fuel = if self.role == Role::Cdp2017 { "2.5 GWh" } else { "2600" };

        html += &module(
            "ORSMENU_3",
            "Page: CC8. Emissions Data",
            &[
                question(
                    "CC8.2",
                    "Please provide your gross global Scope 1 emissions figures in metric tonnes CO2e",
                    &format!("<p>{}</p>", esc(&s1)),
                ),
                question(
                    "CC8.3a",
                    "Please provide your gross global Scope 2 emissions figures in metric tonnes CO2e",
                    &table(Layout::Legacy, &["Scope 2, location-based", "Scope 2, market-based"], &[vec![lb, mb]]),
                ),
                question(
                    "CC11.2",
                    "Please state how much heat, steam, and cooling in MWh your organization has purchased",
                    &table(
                        Layout::Legacy,
                        &["Energy type", "MWh"],
                        &[row(&["Heat", "40"]), row(&["Steam", ""]), row(&["Cooling", "15"])],
                    ),
                ),
                question(
                    "CC11.3",
                    "Please state how much fuel in MWh your organization has consumed",
                    &format!("<p>{}</p>", fuel),
                ),
                question(
                    "CC11.4",
                    "Please provide details of the electricity, heat, steam or cooling amounts accounted at a low carbon emission factor",
                    &table(
                        Layout::Legacy,
                        &[
                            "Basis for applying a low carbon emission factor",
                            "MWh consumed associated with low carbon electricity, heat, steam or cooling",
                            "Comment",
                        ],
                        &[row(&["Grid mix of renewable electricity", "150", ""])],
                    ),
                ),
                question(
                    "CC11.5",
                    "Please report how much electricity you produce in MWh",
                    &table(
                        Layout::Legacy,
                        &[
                            "Total electricity consumed (MWh)",
                            "Consumed electricity that is purchased (MWh)",
                            "Total electricity produced (MWh)",
                            "Total renewable electricity produced (MWh)",
                            "Consumed renewable electricity that is produced by company (MWh)",
                        ],
                        &[row(&["1100", "900", "200", "150", "120"])],
                    ),
                ),
                question(
                    "CC14.1",
                    "Please account for your organization's Scope 3 emissions",
                    &table(
                        Layout::Legacy,
                        &["Sources of Scope 3 emissions", "Evaluation status", "metric tonnes CO2e"],
                        &[
                            row(&["Purchased goods and services", "Relevant, calculated", "4000"]),
                            row(&["Business travel", "Not relevant, explanation provided", ""]),
                        ],
                    ),
                ),
            ],
        );

        html += "</div>";
        html
    }
}

/// Write the five questionnaires of `company` into `dir/<company>/`.
pub fn write_company(dir: &Path, company: &str) -> Vec<PathBuf> {
    write_company_with(dir, company, |_| {})
}

/// Like [`write_company`], letting `tweak` adjust each questionnaire first.
pub fn write_company_with(dir: &Path, company: &str, mut tweak: impl FnMut(&mut Questionnaire)) -> Vec<PathBuf> {
    let folder = dir.join(company);
    fs::create_dir_all(&folder).unwrap();
    Role::ALL
        .into_iter()
        .map(|role| {
            let mut q = Questionnaire::new(role);
            q.company(company);
            tweak(&mut q);
            let path = folder.join(format!("cdp_{}.html", role.cycle()));
            fs::write(&path, q.render()).unwrap();
            path
        })
        .collect()
}

/// Load, extract and validate the fixture company written by `write_company`.
pub fn record(dir: &Path, company: &str) -> CompanyRecord {
    record_from(company, &write_company(dir, company))
}

pub fn record_from(company: &str, paths: &[PathBuf]) -> CompanyRecord {
    let set = load_company(company, paths, &EmptyIndex).unwrap();
    let extraction = extract_company(&set).unwrap();
    let report = Validator::default().validate(&extraction.values, extraction.reporting_year);
    CompanyRecord::new(company, extraction.reporting_year, extraction.values, report)
}

fn esc(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> String {
    items
        .iter()
        .map(|(label, value)| format!("<p>{}</p>\n<p>{}</p>\n", esc(label), esc(value)))
        .collect()
}

fn section(id: &str, heading: &str, body: &str) -> String {
    format!("<div id=\"{}\">\n<h4>{}</h4>\n{}</div>\n", id, esc(heading), body)
}

fn table(layout: Layout, header: &[&str], rows: &[Vec<String>]) -> String {
    let class = match layout {
        Layout::Modern => "ndp_formatted_response__table",
        Layout::Legacy => "cdp-question-body-table",
    };
    let head: String = header.iter().map(|h| format!("<th>{}</th>", cell(layout, h))).collect();
    let body: String = rows
        .iter()
        .map(|r| {
            let cells: String = r.iter().map(|c| format!("<td>{}</td>", cell(layout, c))).collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();
    format!(
        "<table class=\"{}\"><thead><tr>{}</tr></thead><tbody>{}</tbody></table>\n",
        class, head, body
    )
}

// legacy cells wrap their text in a span and break it with zero-width spaces
fn cell(layout: Layout, text: &str) -> String {
    match layout {
        Layout::Modern => esc(text),
        Layout::Legacy => format!("<span>{}\u{200b}</span>", esc(text)),
    }
}

fn question(code: &str, text: &str, answer: &str) -> String {
    format!(
        "<div class=\"cdp-question\"><div class=\"cdp-question-head\"><h4>{}</h4><p>{}</p></div>{}</div>\n",
        code,
        esc(text),
        answer
    )
}

fn module(id: &str, page: &str, questions: &[String]) -> String {
    format!(
        "<div id=\"{}\" class=\"cdp-module\"><div class=\"cdp-module-body\"><div class=\"cdp-page\"><div class=\"cdp-page-head\"><h3>{}</h3></div><div class=\"cdp-page-body\">\n{}</div></div></div></div>\n",
        id,
        page,
        questions.concat()
    )
}
