//! Number and unit parsing for extracted field text.

use std::sync::LazyLock;

use regex::Regex;

/// A number followed by an optional unit word, e.g. `75cl`, `1.5 L`, `750`,
/// `1,500ml`.
static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?)\s*([a-z]+)?")
        .unwrap_or_else(|_| unreachable!())
});

/// Digits grouped in thousands, e.g. `1,500` or `1,500.5`.
static GROUPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?$").unwrap_or_else(|_| unreachable!())
});

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap_or_else(|_| unreachable!()));

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").unwrap_or_else(|_| unreachable!()));

/// Text in a format no parser recognizes. Unlike a missing field this stops
/// the run, so the retailer's rules get fixed instead of silently producing
/// wrong numbers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {what} format: '{text}'")]
pub struct UnrecognizedFormat {
    /// What was being parsed (e.g. `"bottle size"`).
    pub what: &'static str,
    /// The offending text.
    pub text: String,
}

/// Centilitres per unit, for the volume units retailers print.
fn centilitres_per(unit: &str) -> Option<f64> {
    match unit {
        "cl" => Some(1.0),
        "ml" => Some(0.1),
        "l" | "lt" | "ltr" | "litre" | "litres" | "liter" | "liters" => Some(100.0),
        _ => None,
    }
}

/// Interprets a bare number by magnitude: above 100 it is millilitres,
/// below 10 litres, otherwise centilitres.
fn unlabeled_to_cl(value: f64) -> f64 {
    if value > 100.0 {
        value / 10.0
    } else if value < 10.0 {
        value * 100.0
    } else {
        value
    }
}

/// A comma groups thousands (`1,500`) or, on its own, marks decimals (`1,5`).
fn parse_quantity(raw: &str) -> Option<f64> {
    let normalized = if GROUPED.is_match(raw) {
        raw.replace(',', "")
    } else {
        raw.replace(',', ".")
    };
    normalized.parse().ok()
}

/// Parses a bottle size into centilitres.
///
/// The first number carrying a volume unit wins (`"6 x 75cl"` is 75). When no
/// number carries a unit, the first bare number is read by magnitude.
///
/// # Errors
///
/// Returns [`UnrecognizedFormat`] when the text has no number, or only
/// numbers with units that are not volumes (`"20oz"`).
pub fn parse_bottle_size_cl(text: &str) -> Result<f64, UnrecognizedFormat> {
    let lowered = text.to_lowercase();
    let mut unlabeled = None;

    for caps in QUANTITY.captures_iter(&lowered) {
        let Some(value) = parse_quantity(&caps[1]) else {
            continue;
        };
        match caps.get(2) {
            Some(unit) => {
                if let Some(factor) = centilitres_per(unit.as_str()) {
                    return Ok(value * factor);
                }
            }
            None => {
                unlabeled.get_or_insert(value);
            }
        }
    }

    unlabeled
        .map(unlabeled_to_cl)
        .ok_or_else(|| UnrecognizedFormat {
            what: "bottle size",
            text: text.trim().to_owned(),
        })
}

/// Parses a listed price, dropping the currency symbol and thousands
/// separators (`"£1,299.00"` is 1299.0).
#[must_use]
pub fn parse_price(text: &str) -> Option<f64> {
    parse_first_number(&text.replace(',', ""))
}

/// First decimal number in `text` (`"13.5% vol"` is 13.5).
#[must_use]
pub fn parse_first_number(text: &str) -> Option<f64> {
    DECIMAL.find(text)?.as_str().parse().ok()
}

/// First whole number in `text`, ignoring thousands separators
/// (`"(1,204 reviews)"` is 1204).
#[must_use]
pub fn parse_count(text: &str) -> Option<u32> {
    INTEGER.find(&text.replace(',', ""))?.as_str().parse().ok()
}
