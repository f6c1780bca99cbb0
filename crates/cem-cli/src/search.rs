//! Web search over the DuckDuckGo HTML endpoint and price lookups built on
//! top of it.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cem_core::price::{extract_prices, summarize};
use cem_core::time::now_iso8601;

use crate::config::SearchConfig;

static RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
        .unwrap_or_else(|e| panic!("result link pattern: {e}"))
});

static RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|div|td)>"#)
        .unwrap_or_else(|e| panic!("snippet pattern: {e}"))
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap_or_else(|e| panic!("tag pattern: {e}")));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|e| panic!("whitespace pattern: {e}")));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone)]
pub struct WebSearch {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            max_results: config.max_results,
        })
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        tracing::debug!(query, "web search");
        let html = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await
            .context("search request failed")?
            .error_for_status()
            .context("search endpoint returned an error")?
            .text()
            .await
            .context("failed to read search response")?;
        Ok(parse_results(&html, max_results))
    }

    /// Retail price lookup for a product. Always returns a JSON object with a
    /// `status` of `success`, `not_found`, `prices_not_found` or `error`.
    pub async fn product_price(&self, product: &str, quantity: u32, max_results: usize) -> Value {
        let query = format!("{product} price buy online");
        let hits = match self.search(&query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(product, error = %e, "product search failed");
                return json!({"status": "error", "product": product, "error": format!("{e:#}")});
            }
        };
        product_price_response(product, quantity, &hits, max_results)
    }

    pub async fn material_price(&self, material: &str, unit: &str, max_results: usize) -> Value {
        let query = format!("{material} price per {unit} bulk industrial supplier");
        let hits = match self.search(&query, max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(material, error = %e, "material search failed");
                return json!({"status": "error", "material": material, "error": format!("{e:#}")});
            }
        };
        material_price_response(material, unit, &hits, max_results)
    }
}

// --- Pure helpers ---

/// Pull result titles, target URLs and snippets out of a DuckDuckGo HTML page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = RESULT_SNIPPET
        .captures_iter(html)
        .map(|c| clean_text(&c[1]))
        .collect();
    RESULT_LINK
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: clean_text(&c[2]),
            url: resolve_result_url(&decode_entities(&c[1])),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .take(max_results)
        .collect()
}

fn clean_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// DuckDuckGo wraps targets in `//duckduckgo.com/l/?uddg=<encoded>`.
fn resolve_result_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    reqwest::Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

fn snippet_prefix(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Prices found in the hits plus up to three sources that produced one.
pub fn collect_prices(hits: &[SearchHit]) -> (Vec<f64>, Vec<Value>) {
    let mut prices = Vec::new();
    let mut sources = Vec::new();
    for hit in hits {
        let found = extract_prices(&hit.snippet);
        if found.is_empty() {
            continue;
        }
        prices.extend(found.iter().map(|p| p.value));
        sources.push(json!({
            "title": hit.title,
            "url": hit.url,
            "snippet": snippet_prefix(&hit.snippet, 200),
        }));
    }
    sources.truncate(3);
    (prices, sources)
}

pub fn product_price_response(
    product: &str,
    quantity: u32,
    hits: &[SearchHit],
    max_results: usize,
) -> Value {
    if hits.is_empty() {
        return json!({
            "status": "not_found",
            "product": product,
            "quantity": quantity,
            "message": "No search results found",
        });
    }
    let (prices, sources) = collect_prices(hits);
    match summarize(&prices, max_results) {
        Some(stats) => json!({
            "status": "success",
            "product": product,
            "quantity": quantity,
            "prices": stats.prices,
            "average": stats.average,
            "min": stats.min,
            "max": stats.max,
            "currency": "USD",
            "sources": sources,
            "confidence": stats.confidence,
            "timestamp": now_iso8601(),
        }),
        None => json!({
            "status": "prices_not_found",
            "product": product,
            "message": "Found results but no prices extracted",
            "sources": hits.iter().take(3).map(|h| json!({"title": h.title, "url": h.url})).collect::<Vec<_>>(),
        }),
    }
}

pub fn material_price_response(
    material: &str,
    unit: &str,
    hits: &[SearchHit],
    max_results: usize,
) -> Value {
    if hits.is_empty() {
        return json!({"status": "not_found", "material": material, "unit": unit});
    }
    let (prices, sources) = collect_prices(hits);
    match summarize(&prices, max_results) {
        Some(stats) => json!({
            "status": "success",
            "material": material,
            "unit": unit,
            "prices": stats.prices,
            "average_price": stats.average,
            "min_price": stats.min,
            "max_price": stats.max,
            "currency": "USD",
            "sources": sources,
            "confidence": stats.confidence,
            "timestamp": now_iso8601(),
        }),
        None => json!({
            "status": "prices_not_found",
            "material": material,
            "unit": unit,
            "sources": hits.iter().take(3).map(|h| json!({"title": h.title, "url": h.url})).collect::<Vec<_>>(),
        }),
    }
}
