//! Price extraction from free text such as search-result snippets.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::compile;

const NUM: &str = r"[0-9][0-9,]*(?:\.[0-9]+)?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFormat {
    StandardUsd,
    StandardEur,
    StandardGbp,
    CurrencyCode,
    PricePerUnit,
    Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPrice {
    pub format: PriceFormat,
    /// The price, or the lower bound of a range.
    pub value: f64,
    /// Upper bound of a range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub currency: String,
    /// Unit the price is quoted per, e.g. "kg".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_unit: Option<String>,
    pub text: String,
    /// Byte offset in the source text.
    pub position: usize,
}

static PATTERNS: LazyLock<Vec<(PriceFormat, Regex)>> = LazyLock::new(|| {
    vec![
        (
            PriceFormat::Range,
            compile(&format!(r"(?i)\$\s*({NUM})\s*-\s*\$?\s*({NUM})")),
        ),
        (
            PriceFormat::StandardUsd,
            compile(&format!(r"(?i)\$\s*({NUM})(?:\s*USD)?")),
        ),
        (
            PriceFormat::StandardEur,
            compile(&format!(r"(?i)€\s*({NUM})(?:\s*EUR)?")),
        ),
        (
            PriceFormat::StandardGbp,
            compile(&format!(r"(?i)£\s*({NUM})(?:\s*GBP)?")),
        ),
        (
            PriceFormat::CurrencyCode,
            compile(&format!(r"(?i)({NUM})\s*(USD|EUR|GBP|JPY|CNY|INR)\b")),
        ),
        (
            PriceFormat::PricePerUnit,
            compile(&format!(r"(?i)({NUM})\s*(?:per|/)\s*(kg|lb|oz|m³|m3|unit|piece)")),
        ),
    ]
});

/// Parse a number that may carry thousands separators.
pub fn clean_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn raw_matches(text: &str) -> Vec<(usize, usize, ExtractedPrice)> {
    let mut found = Vec::new();
    for (format, re) in PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(value) = caps.get(1).and_then(|m| clean_number(m.as_str())) else {
                continue;
            };
            let second = caps.get(2).map(|m| m.as_str());
            let (max, currency, per_unit) = match format {
                PriceFormat::Range => (second.and_then(clean_number), "USD".to_string(), None),
                PriceFormat::StandardEur => (None, "EUR".to_string(), None),
                PriceFormat::StandardGbp => (None, "GBP".to_string(), None),
                PriceFormat::CurrencyCode => (
                    None,
                    second.unwrap_or("USD").to_ascii_uppercase(),
                    None,
                ),
                PriceFormat::PricePerUnit => (
                    None,
                    "USD".to_string(),
                    second.map(|u| u.to_lowercase()),
                ),
                PriceFormat::StandardUsd => (None, "USD".to_string(), None),
            };
            found.push((
                whole.start(),
                whole.end(),
                ExtractedPrice {
                    format: *format,
                    value,
                    max,
                    currency,
                    per_unit,
                    text: whole.as_str().to_string(),
                    position: whole.start(),
                },
            ));
        }
    }
    found
}

/// All prices in `text`, ordered by position.
///
/// Overlapping matches collapse into the earliest, longest one; a per-unit
/// suffix overlapping a kept price annotates it instead.
pub fn extract_prices(text: &str) -> Vec<ExtractedPrice> {
    let mut found = raw_matches(text);
    found.sort_by(|a, b| a.0.cmp(&b.0).then((b.1 - b.0).cmp(&(a.1 - a.0))));

    let mut kept: Vec<ExtractedPrice> = Vec::new();
    let mut kept_end = 0usize;
    for (start, end, price) in found {
        if kept.is_empty() || start >= kept_end {
            kept_end = end;
            kept.push(price);
            continue;
        }
        if price.format == PriceFormat::PricePerUnit
            && let Some(last) = kept.last_mut()
            && last.per_unit.is_none()
        {
            last.per_unit = price.per_unit;
            kept_end = kept_end.max(end);
        }
    }
    kept
}

/// The most likely price: the first one found, or the low end of a range.
pub fn extract_best_price(text: &str) -> Option<f64> {
    extract_prices(text).first().map(|p| p.value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub prices: Vec<f64>,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Share of the requested result count that produced a price, capped at 1.
    pub confidence: f64,
}

/// Aggregate extracted prices; `None` when there are none.
pub fn summarize(prices: &[f64], max_results: usize) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average = prices.iter().sum::<f64>() / prices.len() as f64;
    let confidence = (prices.len() as f64 / max_results.max(1) as f64).min(1.0);
    Some(PriceStats {
        prices: prices.to_vec(),
        average,
        min,
        max,
        confidence,
    })
}
