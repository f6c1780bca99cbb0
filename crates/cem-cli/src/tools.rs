//! Pricing and cost tools shared by the HTTP `/tools` routes and the MCP
//! server, plus the registry that describes them for LLM function calling.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use cem_core::costing::{
    Complexity, convert_currency, density_lookup, estimate_manufacturing_cost, material_cost,
    price_per_kg_factor,
};
use cem_core::time::now_iso8601;
use cem_store::cache::{
    currency_key, density_key, manufacturing_key, material_key, product_key,
};
use cem_store::{CacheMeta, CacheStore, MemoryCache, Store};

use crate::config::{CacheTtlConfig, Config};
use crate::search::WebSearch;

// --- Registry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Pricing,
    Calculation,
    Conversion,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolParameter {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(rename = "enum", skip_serializing_if = "no_values")]
    pub allowed: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ToolCategory,
    pub parameters: &'static [ToolParameter],
}

fn no_values(v: &&[&str]) -> bool {
    v.is_empty()
}

const fn param(
    name: &'static str,
    kind: &'static str,
    description: &'static str,
    required: bool,
) -> ToolParameter {
    ToolParameter {
        name,
        kind,
        description,
        required,
        allowed: &[],
        default: None,
    }
}

pub const TOOLS: [ToolDefinition; 6] = [
    ToolDefinition {
        name: "product_price_lookup",
        description: "Look up current market prices for products and components (servos, motors, electronics)",
        category: ToolCategory::Pricing,
        parameters: &[
            param("product_name", "string", "Name or part number of the product", true),
            ToolParameter {
                default: Some("1"),
                ..param("quantity", "integer", "Number of units to price", false)
            },
            ToolParameter {
                default: Some("US"),
                ..param("region", "string", "Geographic region for pricing", false)
            },
        ],
    },
    ToolDefinition {
        name: "material_price_lookup",
        description: "Look up prices for raw materials (metals, alloys, polymers, composites)",
        category: ToolCategory::Pricing,
        parameters: &[
            param("material_name", "string", "Material name, e.g. \"6061 Aluminum\"", true),
            ToolParameter {
                allowed: &["kg", "lb", "g", "m3", "cm3"],
                default: Some("kg"),
                ..param("unit", "string", "Unit of measurement", false)
            },
            param("purity_grade", "string", "Material grade or specification", false),
        ],
    },
    ToolDefinition {
        name: "density_lookup",
        description: "Look up material density to convert volume to mass",
        category: ToolCategory::Calculation,
        parameters: &[
            param("material_name", "string", "Material name", true),
            ToolParameter {
                allowed: &["g/cm3", "kg/m3", "lb/in3", "lb/ft3"],
                default: Some("g/cm3"),
                ..param("unit", "string", "Unit for the returned density", false)
            },
        ],
    },
    ToolDefinition {
        name: "material_cost_calculator",
        description: "Calculate raw material cost from a price per kg and a quantity",
        category: ToolCategory::Calculation,
        parameters: &[
            param("material_name", "string", "Material name", true),
            param("quantity", "number", "Quantity of material", true),
            ToolParameter {
                allowed: &["kg", "g", "lb", "oz", "mg"],
                ..param("unit", "string", "Unit of quantity", true)
            },
            param("price_per_unit", "number", "Price per kg (from material_price_lookup)", true),
            ToolParameter {
                default: Some("USD"),
                ..param("unit_price", "string", "Currency of the price", false)
            },
        ],
    },
    ToolDefinition {
        name: "manufacturing_cost_estimator",
        description: "Estimate manufacturing cost from method, material and part weight",
        category: ToolCategory::Calculation,
        parameters: &[
            ToolParameter {
                allowed: &[
                    "FDM", "SLA", "SLS", "DMLS", "SLM", "CNC", "Machining", "Casting", "Forging",
                    "Sheet_Metal",
                ],
                ..param("manufacturing_method", "string", "Manufacturing process", true)
            },
            param("material", "string", "Material being used", true),
            param("weight_g", "number", "Part weight in grams", true),
            param("volume_cm3", "number", "Part volume in cubic centimeters", false),
            ToolParameter {
                allowed: &["simple", "moderate", "complex"],
                default: Some("moderate"),
                ..param("complexity", "string", "Part complexity", false)
            },
            param("post_processing", "string", "Post-processing requirement", false),
        ],
    },
    ToolDefinition {
        name: "currency_convert",
        description: "Convert between currencies using the built-in rate table",
        category: ToolCategory::Conversion,
        parameters: &[
            param("amount", "number", "Amount to convert", true),
            param("from_currency", "string", "Source currency code (USD, EUR, GBP, ...)", true),
            param("to_currency", "string", "Target currency code", true),
        ],
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOLS.iter().find(|t| t.name == name)
}

pub fn tools_in_category(category: ToolCategory) -> Vec<&'static ToolDefinition> {
    TOOLS.iter().filter(|t| t.category == category).collect()
}

/// OpenAI-style function schemas for every registered tool.
pub fn function_schemas() -> Vec<Value> {
    TOOLS
        .iter()
        .map(|t| {
            let properties: serde_json::Map<String, Value> = t
                .parameters
                .iter()
                .map(|p| {
                    let mut prop = json!({"type": p.kind, "description": p.description});
                    if !p.allowed.is_empty() {
                        prop["enum"] = json!(p.allowed);
                    }
                    (p.name.to_string(), prop)
                })
                .collect();
            let required: Vec<&str> = t
                .parameters
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name)
                .collect();
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    },
                },
            })
        })
        .collect()
}

// --- Requests ---

fn default_quantity() -> u32 {
    1
}

fn default_region() -> String {
    "US".into()
}

fn default_kg() -> String {
    "kg".into()
}

fn default_density_unit() -> String {
    "g/cm3".into()
}

fn default_usd() -> String {
    "USD".into()
}

fn default_complexity() -> String {
    "moderate".into()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProductPriceRequest {
    /// Name or part number of the product
    pub product_name: String,
    /// Number of units to price
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Geographic region for pricing
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MaterialPriceRequest {
    /// Material name, e.g. "6061 Aluminum"
    pub material_name: String,
    /// kg, lb, g, m3 or cm3
    #[serde(default = "default_kg")]
    pub unit: String,
    /// Optional grade or specification
    pub purity_grade: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DensityRequest {
    /// Material name
    pub material_name: String,
    /// g/cm3, kg/m3, lb/in3 or lb/ft3
    #[serde(default = "default_density_unit")]
    pub unit: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MaterialCostRequest {
    /// Material name
    pub material_name: String,
    /// Quantity of material
    pub quantity: f64,
    /// kg, g, lb, oz or mg
    pub unit: String,
    /// Price per kg
    pub price_per_unit: f64,
    /// Currency of the price
    #[serde(default = "default_usd")]
    pub unit_price: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ManufacturingCostRequest {
    /// FDM, SLA, SLS, DMLS, SLM, CNC, Machining, Casting, Forging or Sheet_Metal
    pub manufacturing_method: String,
    /// Material being used
    pub material: String,
    /// Part weight in grams
    pub weight_g: f64,
    /// Part volume in cubic centimeters
    pub volume_cm3: Option<f64>,
    /// simple, moderate or complex
    #[serde(default = "default_complexity")]
    pub complexity: String,
    /// e.g. polishing, anodizing, painting
    pub post_processing: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CurrencyRequest {
    /// Amount to convert
    pub amount: f64,
    /// Source currency code
    pub from_currency: String,
    /// Target currency code
    pub to_currency: String,
}

// --- Service ---

/// Executes the registered tools against the shared cache and web search.
#[derive(Clone)]
pub struct PriceTools {
    search: WebSearch,
    cache: Arc<Mutex<CacheStore>>,
    ttl: CacheTtlConfig,
}

impl PriceTools {
    pub fn new(search: WebSearch, cache: Arc<Mutex<CacheStore>>, ttl: CacheTtlConfig) -> Self {
        Self { search, cache, ttl }
    }

    /// Web search plus the layered cache described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = WebSearch::new(&config.search)?;
        let cache = open_cache(config)?;
        tracing::info!(layers = %cache.describe(), "price cache ready");
        Ok(Self::new(search, Arc::new(Mutex::new(cache)), config.cache_ttl.clone()))
    }

    pub fn cache(&self) -> &Arc<Mutex<CacheStore>> {
        &self.cache
    }

    async fn cached(&self, key: &str) -> Option<Value> {
        let hit = self.cache.lock().await.get(key)?;
        tracing::debug!(key, hits = hit.hits, "cache hit");
        Some(hit.annotated_value())
    }

    async fn store(&self, key: &str, value: &Value, ttl: u64, meta: CacheMeta) {
        if !self.cache.lock().await.set(key, value, ttl, &meta) {
            tracing::warn!(key, "result not cached");
        }
    }

    pub async fn product_price_lookup(&self, req: ProductPriceRequest) -> Value {
        tracing::info!(product = %req.product_name, quantity = req.quantity, region = %req.region, "tool: product_price_lookup");
        let key = product_key(&req.product_name, req.quantity);
        if let Some(hit) = self.cached(&key).await {
            return hit;
        }
        let result = self
            .search
            .product_price(&req.product_name, req.quantity, self.search.max_results())
            .await;
        if result["status"] == "success" {
            let meta = CacheMeta::new("product_price", "web_search", confidence_label(&result));
            self.store(&key, &result, self.ttl.product_secs, meta).await;
        }
        result
    }

    pub async fn material_price_lookup(&self, req: MaterialPriceRequest) -> Value {
        tracing::info!(material = %req.material_name, unit = %req.unit, "tool: material_price_lookup");
        let term = match &req.purity_grade {
            Some(grade) if !grade.trim().is_empty() => format!("{} {grade}", req.material_name),
            _ => req.material_name.clone(),
        };
        let key = material_key(&term, &req.unit);
        if let Some(hit) = self.cached(&key).await {
            return hit;
        }
        let mut result = self
            .search
            .material_price(&term, &req.unit, self.search.max_results())
            .await;
        if result["status"] == "success" {
            if !req.unit.eq_ignore_ascii_case("kg")
                && let Some(avg) = result["average_price"].as_f64()
            {
                result["normalized_to_kg"] = json!(avg * price_per_kg_factor(&req.unit));
            }
            let meta = CacheMeta::new("material_price", "web_search", confidence_label(&result));
            self.store(&key, &result, self.ttl.material_secs, meta).await;
        }
        result
    }

    pub async fn density_lookup(&self, req: DensityRequest) -> Value {
        tracing::info!(material = %req.material_name, unit = %req.unit, "tool: density_lookup");
        let key = density_key(&req.material_name, &req.unit);
        if let Some(hit) = self.cached(&key).await {
            return hit;
        }
        let result = match density_lookup(&req.material_name, &req.unit) {
            Ok(d) => json!({
                "status": "success",
                "material": d.material,
                "density": d.density,
                "unit": d.unit,
                "base_unit": "g/cm3",
                "base_density": d.base_density_g_cm3,
                "confidence": "high",
            }),
            Err(cem_core::CemError::UnknownMaterial(_)) => {
                return json!({
                    "status": "not_found",
                    "material": req.material_name,
                    "message": format!("Density not found for {}", req.material_name),
                });
            }
            Err(e) => return error_value(&e.to_string()),
        };
        let meta = CacheMeta::new("density", "material_database", "high");
        self.store(&key, &result, self.ttl.density_secs, meta).await;
        result
    }

    pub fn material_cost_calculator(&self, req: MaterialCostRequest) -> Value {
        tracing::info!(material = %req.material_name, quantity = req.quantity, unit = %req.unit, "tool: material_cost_calculator");
        match material_cost(&req.material_name, req.quantity, &req.unit, req.price_per_unit) {
            Ok(c) => json!({
                "status": "success",
                "material": c.material,
                "input": {"quantity": c.quantity, "unit": c.unit},
                "normalized": {"quantity_kg": c.quantity_kg, "price_per_kg": c.price_per_kg},
                "calculation": c.calculation,
                "total_cost": c.total_cost,
                "currency": req.unit_price,
                "timestamp": now_iso8601(),
            }),
            Err(e) => error_value(&e.to_string()),
        }
    }

    pub async fn manufacturing_cost_estimator(&self, req: ManufacturingCostRequest) -> Value {
        tracing::info!(method = %req.manufacturing_method, material = %req.material, weight_g = req.weight_g, "tool: manufacturing_cost_estimator");
        let key = manufacturing_key(
            &req.manufacturing_method,
            &req.material,
            req.weight_g,
            &req.complexity,
        );
        let key = match &req.post_processing {
            Some(p) => format!("{key}:{}", p.trim().to_lowercase()),
            None => key,
        };
        if let Some(hit) = self.cached(&key).await {
            return hit;
        }
        let complexity = Complexity::from_name(&req.complexity);
        let est = match estimate_manufacturing_cost(
            &req.manufacturing_method,
            &req.material,
            req.weight_g,
            complexity,
            req.post_processing.as_deref(),
        ) {
            Ok(est) => est,
            Err(e) => return error_value(&e.to_string()),
        };
        let mut result = json!({
            "status": "success",
            "method": est.method,
            "material": est.material,
            "weight_g": est.weight_g,
            "complexity": est.complexity,
            "costs": {
                "base_cost_per_g": est.base_cost_per_g,
                "complexity_multiplier": est.complexity_multiplier,
                "setup_cost": est.setup_cost,
                "manufacturing_cost": est.manufacturing_cost,
                "post_processing_cost": est.post_processing_cost,
            },
            "calculation": {
                "manufacturing": format!(
                    "({}$/g × {}g × {}) + ${} = ${:.2}",
                    est.base_cost_per_g, est.weight_g, est.complexity_multiplier,
                    est.setup_cost, est.manufacturing_cost
                ),
                "post_processing": format!(
                    "{}: ${:.2}",
                    req.post_processing.as_deref().unwrap_or("None"),
                    est.post_processing_cost
                ),
                "total": format!("${:.2}", est.total_cost),
            },
            "total_cost": est.total_cost,
            "currency": "USD",
            "confidence": "medium",
            "note": "Raw material cost not included. Call material_cost_calculator for an accurate total.",
            "timestamp": now_iso8601(),
        });
        if let Some(volume) = req.volume_cm3
            && let Some(density) = cem_core::costing::find_density(&req.material)
        {
            result["volume_cm3"] = json!(volume);
            result["estimated_mass_from_volume_g"] = json!(cem_core::costing::round_cents(volume * density));
        }
        let meta = CacheMeta::new("manufacturing_cost", "cost_model", "medium");
        self.store(&key, &result, self.ttl.manufacturing_secs, meta).await;
        result
    }

    pub async fn currency_convert(&self, req: CurrencyRequest) -> Value {
        tracing::info!(amount = req.amount, from = %req.from_currency, to = %req.to_currency, "tool: currency_convert");
        let conv = match convert_currency(req.amount, &req.from_currency, &req.to_currency) {
            Ok(c) => c,
            Err(e) => return error_value(&e.to_string()),
        };
        // Rates are cached per pair; amounts are applied on top.
        let key = currency_key(&conv.from_currency, &conv.to_currency);
        let rate = match self.cached(&key).await {
            Some(hit) => hit["exchange_rate"].as_f64().unwrap_or(conv.exchange_rate),
            None => {
                let meta = CacheMeta::new("currency", "static_rates", "high");
                self.store(&key, &json!({"exchange_rate": conv.exchange_rate}), self.ttl.currency_secs, meta)
                    .await;
                conv.exchange_rate
            }
        };
        json!({
            "status": "success",
            "from_amount": conv.from_amount,
            "from_currency": conv.from_currency,
            "to_amount": conv.to_amount,
            "to_currency": conv.to_currency,
            "exchange_rate": rate,
            "calculation": format!(
                "{} {} × {:.4} = {:.2} {}",
                conv.from_amount, conv.from_currency, rate, conv.to_amount, conv.to_currency
            ),
            "timestamp": now_iso8601(),
        })
    }

    /// Dispatch by registered tool name with JSON arguments.
    pub async fn call(&self, name: &str, args: Value) -> Value {
        fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, Value> {
            serde_json::from_value(args).map_err(|e| error_value(&format!("invalid arguments: {e}")))
        }
        let outcome = match name {
            "product_price_lookup" => match parse(args) {
                Ok(req) => Ok(self.product_price_lookup(req).await),
                Err(e) => Err(e),
            },
            "material_price_lookup" => match parse(args) {
                Ok(req) => Ok(self.material_price_lookup(req).await),
                Err(e) => Err(e),
            },
            "density_lookup" => match parse(args) {
                Ok(req) => Ok(self.density_lookup(req).await),
                Err(e) => Err(e),
            },
            "material_cost_calculator" => parse(args).map(|req| self.material_cost_calculator(req)),
            "manufacturing_cost_estimator" => match parse(args) {
                Ok(req) => Ok(self.manufacturing_cost_estimator(req).await),
                Err(e) => Err(e),
            },
            "currency_convert" => match parse(args) {
                Ok(req) => Ok(self.currency_convert(req).await),
                Err(e) => Err(e),
            },
            other => Err(error_value(&format!("Tool not found: {other}"))),
        };
        outcome.unwrap_or_else(|e| e)
    }
}

/// SQLite cache, with the in-process TTL layer in front when `REDIS_URL` is
/// configured.
pub fn open_cache(config: &Config) -> anyhow::Result<CacheStore> {
    use anyhow::Context;

    let sqlite = Store::open_url(&config.database_url)
        .with_context(|| format!("failed to open cache database {}", config.database_url))?;
    Ok(match &config.redis_url {
        Some(url) => {
            tracing::info!(%url, "REDIS_URL set; using the in-process TTL cache in front of SQLite");
            CacheStore::with_fallback(Box::new(MemoryCache::new()), Box::new(sqlite))
        }
        None => CacheStore::new(Box::new(sqlite)),
    })
}

fn confidence_label(result: &Value) -> &'static str {
    match result["confidence"].as_f64() {
        Some(c) if c >= 0.8 => "high",
        Some(c) if c >= 0.4 => "medium",
        _ => "low",
    }
}

pub fn error_value(message: &str) -> Value {
    json!({"status": "error", "error": message})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;

    fn tools() -> PriceTools {
        let cache = CacheStore::with_fallback(
            Box::new(MemoryCache::new()),
            Box::new(Store::open_in_memory().unwrap()),
        );
        let search = WebSearch::new(&SearchConfig {
            base_url: "http://127.0.0.1:9/unreachable".into(),
            timeout_secs: 1,
            ..SearchConfig::default()
        })
        .unwrap();
        PriceTools::new(search, Arc::new(Mutex::new(cache)), CacheTtlConfig::default())
    }

    #[test]
    fn test_registry() {
        assert_eq!(TOOLS.len(), 6);
        assert!(find_tool("density_lookup").is_some());
        assert!(find_tool("weather").is_none());
        assert_eq!(tools_in_category(ToolCategory::Pricing).len(), 2);

        let schemas = function_schemas();
        let mfg = schemas
            .iter()
            .find(|s| s["function"]["name"] == "manufacturing_cost_estimator")
            .unwrap();
        let required = mfg["function"]["parameters"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(
            mfg["function"]["parameters"]["properties"]["complexity"]["enum"][2],
            "complex"
        );
    }

    #[tokio::test]
    async fn test_density_cached_on_second_call() {
        let t = tools();
        let req = DensityRequest {
            material_name: "PLA".into(),
            unit: "kg/m3".into(),
        };
        let first = t.density_lookup(req.clone()).await;
        assert_eq!(first["status"], "success");
        assert_eq!(first["density"], 1240.0);
        assert!(first.get("_cache_metadata").is_none());

        let second = t.density_lookup(req).await;
        assert_eq!(second["density"], 1240.0);
        assert_eq!(second["_cache_metadata"]["hits"], 1);
    }

    #[tokio::test]
    async fn test_density_statuses() {
        let t = tools();
        let missing = t
            .density_lookup(DensityRequest {
                material_name: "unobtainium".into(),
                unit: "g/cm3".into(),
            })
            .await;
        assert_eq!(missing["status"], "not_found");
        let bad_unit = t
            .density_lookup(DensityRequest {
                material_name: "PLA".into(),
                unit: "stone/acre".into(),
            })
            .await;
        assert_eq!(bad_unit["status"], "error");
    }

    #[tokio::test]
    async fn test_manufacturing_estimate() {
        let t = tools();
        let v = t
            .manufacturing_cost_estimator(ManufacturingCostRequest {
                manufacturing_method: "FDM".into(),
                material: "PLA".into(),
                weight_g: 100.0,
                volume_cm3: Some(80.0),
                complexity: "simple".into(),
                post_processing: Some("polishing".into()),
            })
            .await;
        assert_eq!(v["status"], "success");
        assert_eq!(v["costs"]["manufacturing_cost"], 15.0);
        assert_eq!(v["total_cost"], 45.0);
        assert_eq!(v["estimated_mass_from_volume_g"], 99.2);

        let unknown = t
            .manufacturing_cost_estimator(ManufacturingCostRequest {
                manufacturing_method: "Waterjet".into(),
                material: "PLA".into(),
                weight_g: 1.0,
                volume_cm3: None,
                complexity: "moderate".into(),
                post_processing: None,
            })
            .await;
        assert_eq!(unknown["status"], "error");
    }

    #[tokio::test]
    async fn test_currency_and_material_cost() {
        let t = tools();
        let v = t
            .currency_convert(CurrencyRequest {
                amount: 100.0,
                from_currency: "usd".into(),
                to_currency: "EUR".into(),
            })
            .await;
        assert_eq!(v["status"], "success");
        assert_eq!(v["to_amount"], 92.0);
        assert_eq!(v["from_currency"], "USD");

        let bad = t
            .currency_convert(CurrencyRequest {
                amount: 1.0,
                from_currency: "XYZ".into(),
                to_currency: "USD".into(),
            })
            .await;
        assert_eq!(bad["status"], "error");

        let cost = t.material_cost_calculator(MaterialCostRequest {
            material_name: "Aluminum".into(),
            quantity: 500.0,
            unit: "g".into(),
            price_per_unit: 4.0,
            unit_price: "USD".into(),
        });
        assert_eq!(cost["total_cost"], 2.0);
    }

    #[tokio::test]
    async fn test_call_dispatch() {
        let t = tools();
        let v = t
            .call("density_lookup", json!({"material_name": "ABS"}))
            .await;
        assert_eq!(v["density"], 1.04);
        let bad_args = t.call("density_lookup", json!({"unit": "g/cm3"})).await;
        assert_eq!(bad_args["status"], "error");
        let unknown = t.call("weather", json!({})).await;
        assert!(unknown["error"].as_str().unwrap().contains("weather"));
    }

    #[test]
    fn test_open_cache_layers() {
        let mut config = Config {
            database_url: ":memory:".into(),
            ..Config::default()
        };
        assert_eq!(open_cache(&config).unwrap().describe(), "sqlite");
        config.redis_url = Some("redis://localhost:6379".into());
        assert_eq!(open_cache(&config).unwrap().describe(), "memory -> sqlite");
    }

    #[tokio::test]
    async fn test_search_failure_is_an_error_status() {
        let t = tools();
        let v = t
            .product_price_lookup(ProductPriceRequest {
                product_name: "MG996R".into(),
                quantity: 1,
                region: "US".into(),
            })
            .await;
        assert_eq!(v["status"], "error");
        let stats = t.cache().lock().await.stats().unwrap();
        assert_eq!(stats.primary.total_entries, 0, "errors are not cached");
    }
}
