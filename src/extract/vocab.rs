// src/extract/vocab.rs
//
// Controlled vocabularies: questionnaire phrasing → canonical category.
// Phrasings changed between cycles, so most categories list several.

pub type Vocabulary = &'static [(&'static str, &'static [&'static str])];

/// Exact (case-sensitive, trimmed) match against a vocabulary.
pub fn classify(vocab: Vocabulary, text: &str) -> Option<&'static str> {
    let text = text.trim();
    vocab
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| *p == text))
        .map(|(canonical, _)| *canonical)
}

/// Substring match, for answers that embed the phrase in a longer sentence.
pub fn classify_contains(vocab: Vocabulary, text: &str) -> Option<&'static str> {
    vocab
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| text.contains(p)))
        .map(|(canonical, _)| *canonical)
}

/// Canonical terms of a vocabulary, in declaration order.
pub fn terms(vocab: Vocabulary) -> Vec<&'static str> {
    vocab.iter().map(|(c, _)| *c).collect()
}

pub const METHODOLOGY: Vocabulary = &[
    ("GHG Protocol", &["The Greenhouse Gas Protocol"]),
    ("ISO14064-1", &["ISO 14064-1"]),
    ("The Climate Registry (TCR)", &["The Climate Registry"]),
];

pub const VERIFICATION: Vocabulary = &[
    ("No data given", &["No emissions data provided"]),
    ("No external verification", &["No third-party verification or assurance"]),
    (
        "Third party verification",
        &["Third-party verification or assurance process in place"],
    ),
];

pub const HEATING_VALUE: Vocabulary = &[
    ("LHV", &["LHV (lower heating value)"]),
    ("HHV", &["HHV (higher heating value)"]),
    ("Unknown", &["Unable to confirm heating value"]),
];

pub const TARGET_SCOPE: Vocabulary = &[
    ("S1", &["Scope 1"]),
    ("S2 LB", &["Scope 2 (location-based)"]),
    ("S2 MB", &["Scope 2 (market-based)"]),
    ("S1+2 LB", &["Scope 1+2 (location-based)"]),
    ("S1+2 MB", &["Scope 1+2 (market-based)"]),
    ("S3 up", &["Scope 3 (upstream)"]),
    ("S3 down", &["Scope 3 (downstream)"]),
    ("S3", &["Scope 3 (upstream & downstream)"]),
    ("S1+2+3", &["Scope 1+2+3 (location-based)", "Scope 1+2+3 (market-based)"]),
];

pub const SCOPE3_CATEGORY: Vocabulary = &[
    ("S3 C1", &["Purchased goods and services"]),
    ("S3 C2", &["Capital goods"]),
    (
        "S3 C3",
        &["Fuel-and-energy-related activities (not included in Scope 1 or 2)"],
    ),
    ("S3 C4", &["Upstream transportation and distribution"]),
    ("S3 C5", &["Waste generated in operations"]),
    ("S3 C6", &["Business travel"]),
    ("S3 C7", &["Employee commuting"]),
    ("S3 C8", &["Upstream leased assets"]),
    ("S3 C9", &["Downstream transportation and distribution"]),
    ("S3 C10", &["Processing of sold products"]),
    ("S3 C11", &["Use of sold products"]),
    ("S3 C12", &["End of life treatment of sold products"]),
    ("S3 C13", &["Downstream leased assets"]),
    ("S3 C14", &["Franchises"]),
    ("S3 C15", &["Investments", "Category 15 (Investments)"]),
    ("S3 other (upstream)", &["Other (upstream)"]),
    ("S3 other (downstream)", &["Other (downstream)"]),
];

/// Scope 3 evaluation statuses that come with a figure.
pub const SCOPE3_CALCULATED: [&str; 2] = ["Relevant, calculated", "Not relevant, calculated"];

pub const SOURCING_INSTRUMENT: Vocabulary = &[
    (
        "ppa direct line",
        &[
            "Power purchase agreement (PPA) with on-site/off-site generator owned by a third party with no grid transfers (direct line)",
            "Off-grid energy consumption from an on-site installation or through a direct line to an off-site generator owned by another company",
        ],
    ),
    (
        "ppa w/eac",
        &[
            "Power purchase agreement (PPA) with a grid-connected generator with energy attribute certificates",
            "Power Purchase Agreement (PPA) with energy attribute certificates",
            "Direct procurement contract with a grid-connected generator or Power Purchase Agreement (PPA), supported by energy attribute certificates",
            "Direct procurement contract with a gridconnected generator or Power Purchase Agreement (PPA), supported by energy attribute certificates",
        ],
    ),
    (
        "ppa no eac",
        &[
            "Power purchase agreement (PPA) with a grid-connected generator without energy attribute certificates",
            "Power Purchase Agreement (PPA) without energy attribute certificates",
            "Direct procurement contract with a grid-connected generator or Power Purchase Agreement (PPA), where electricity attribute certificates do not exist or are not required for a usage claim",
            "Direct procurement contract with a gridconnected generator or Power Purchase Agreement (PPA), where electricity attribute certificates do not exist or are not required for a usage claim",
        ],
    ),
    (
        "energy product w/eac",
        &[
            "Green electricity products (e.g. green tariffs) from an energy supplier, supported by energy attribute certificates",
            "Contract with suppliers or utilities ( e.g. green tariff), supported by energy attribute certificates",
            "Contract with suppliers or utilities, supported by energy attribute certificates",
        ],
    ),
    (
        "energy product no eac",
        &[
            "Green electricity products (e.g. green tariffs) from an energy supplier, not supported by energy attribute certificates",
            "Contract with suppliers or utilities (e.g. green tariff), not supported by energy attribute certificates",
            "Contract with suppliers or utilities (e.g. green tariff), not backed by electricity attribute certificates",
            "Contract with suppliers or utilities, with a supplier-specific emission rate, not backed by electricity attribute certificates",
        ],
    ),
    (
        "unbundled eac",
        &[
            "Unbundled energy attribute certificates, Guarantees of Origin",
            "Unbundled energy attribute certificates, Renewable Energy Certificates (RECs)",
            "Unbundled energy attribute certificates, International REC Standard (I-RECs)",
            "Unbundled energy attribute certificates, other - please specify",
            "Energy attribute certificates, Guarantees of Origin",
            "Energy attribute certificates, Renewable Energy Certificates (RECs)",
            "Energy attribute certificates, I-RECs",
        ],
    ),
    ("hsc agreement", &["Heat/steam/cooling supply agreement"]),
    ("grid mix", &["Grid mix of renewable electricity"]),
    (
        "self owned",
        &[
            "Grid-connected electricity generation owned, operated or hosted by the company, where electricity attribute certificates do not exist or are not required for a usage claim",
            "Grid-connected generation owned, operated or hosted by the company, with energy attribute certificates created and retired by company",
        ],
    ),
];

pub const SOURCING_TECHNOLOGY: Vocabulary = &[
    ("solar", &["Solar", "Solar PV", "Concentrated solar power (CSP)"]),
    ("wind", &["Wind"]),
    ("hydro", &["Hydropower"]),
    ("nuclear", &["Nuclear"]),
    ("biomass", &["Biomass", "Biomass (including biogas)"]),
    ("other tech", &["Marine", "Geothermal", "Tidal"]),
    ("unspecified", &["Low-carbon energy mix"]),
];

/// Answers meaning the company bought no low-carbon energy at all.
pub fn is_no_purchase(text: &str) -> bool {
    text.contains("No purchases") || text.starts_with("None")
}

pub const UTILITY_TECHNOLOGY: Vocabulary = &[
    ("coal", &["Coal – hard", "Coal â€“ hard", "Coal - hard"]),
    ("lignite", &["Lignite"]),
    ("oil", &["Oil"]),
    ("gas", &["Gas"]),
    ("biomass", &["Biomass"]),
    ("waste", &["Waste (non-biomass)"]),
    ("nuclear", &["Nuclear"]),
    ("geothermal", &["Geothermal"]),
    ("hydro", &["Hydropower", "Hydroelectric"]),
    ("wind", &["Wind"]),
    ("solar", &["Solar"]),
    ("marine", &["Marine", "Other renewable"]),
    (
        "fossil ccs",
        &["Fossil-fuel plants fitted with CCS", "Other non-renewable"],
    ),
];

/// Fuels counted as biomass when cross-checking renewable fuel consumption.
pub const BIOMASS_FUELS: [&str; 29] = [
    "Agricultural Waste",
    "Animal Fat",
    "Animal/Bone Meal",
    "Bagasse",
    "Bamboo",
    "Biodiesel",
    "Biodiesel Tallow",
    "Biodiesel Waste Cooking Oil",
    "Bioethanol",
    "Biogas",
    "Biogasoline",
    "Biomass Municipal Waste",
    "Biomethane",
    "Charcoal",
    "Grass",
    "Hardwood",
    "Landfill Gas",
    "Liquid Biofuel",
    "Primary Solid Biomass",
    "Softwood",
    "Solid Biomass Waste",
    "Vegetable Oil",
    "Waste Paper and Card",
    "Wood",
    "Wood Chips",
    "Wood Logs",
    "Wood Pellets",
    "Wood Waste",
    "Turpentine",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_phrasings_from_every_cycle() {
        assert_eq!(
            classify(SOURCING_INSTRUMENT, "Energy attribute certificates, I-RECs "),
            Some("unbundled eac")
        );
        assert_eq!(
            classify(SOURCING_INSTRUMENT, "Heat/steam/cooling supply agreement"),
            Some("hsc agreement")
        );
        assert_eq!(classify(SOURCING_INSTRUMENT, "Other, please specify"), None);
    }

    #[test]
    fn methodology_is_found_inside_sentences() {
        assert_eq!(
            classify_contains(METHODOLOGY, "The Greenhouse Gas Protocol: A Corporate Accounting and Reporting Standard (Revised Edition)"),
            Some("GHG Protocol")
        );
        assert_eq!(classify_contains(METHODOLOGY, "In-house method"), None);
    }

    #[test]
    fn terms_keep_order() {
        assert_eq!(terms(HEATING_VALUE), vec!["LHV", "HHV", "Unknown"]);
    }
}
