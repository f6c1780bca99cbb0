use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use cem_core::{assess_ambiguity, parse_prompt};

use crate::tools::{
    CurrencyRequest, DensityRequest, ManufacturingCostRequest, MaterialCostRequest,
    MaterialPriceRequest, PriceTools, ProductPriceRequest,
};

#[derive(Clone)]
pub struct CemServer {
    tools: PriceTools,
    tool_router: ToolRouter<Self>,
}

impl CemServer {
    pub fn new(tools: PriceTools) -> Self {
        Self {
            tools,
            tool_router: Self::tool_router(),
        }
    }
}

fn json_result(value: &Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )]))
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ParsePromptRequest {
    /// Natural language description of the device to design
    prompt: String,
}

#[tool_router]
impl CemServer {
    #[tool(
        description = "Look up current market prices for a product or component (servos, motors, electronics) via web search. Returns min/max/average USD prices, up to three sources and a confidence score. Results are cached for an hour."
    )]
    async fn product_price_lookup(
        &self,
        Parameters(req): Parameters<ProductPriceRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.product_price_lookup(req).await)
    }

    #[tool(
        description = "Look up bulk prices for a raw material (metals, alloys, polymers, composites). Prices quoted per a unit other than kg also carry a per-kg figure."
    )]
    async fn material_price_lookup(
        &self,
        Parameters(req): Parameters<MaterialPriceRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.material_price_lookup(req).await)
    }

    #[tool(description = "Material density in g/cm3, kg/m3, lb/in3 or lb/ft3 for turning volume into mass.")]
    async fn density_lookup(
        &self,
        Parameters(req): Parameters<DensityRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.density_lookup(req).await)
    }

    #[tool(description = "Raw material cost for a quantity given a price per kg.")]
    async fn material_cost_calculator(
        &self,
        Parameters(req): Parameters<MaterialCostRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.material_cost_calculator(req))
    }

    #[tool(
        description = "Estimate manufacturing cost from process, material, part weight and complexity, plus optional post-processing. Raw material cost is not included."
    )]
    async fn manufacturing_cost_estimator(
        &self,
        Parameters(req): Parameters<ManufacturingCostRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.manufacturing_cost_estimator(req).await)
    }

    #[tool(description = "Convert an amount between currencies (USD, EUR, GBP, JPY, CNY and others).")]
    async fn currency_convert(
        &self,
        Parameters(req): Parameters<CurrencyRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.tools.currency_convert(req).await)
    }

    #[tool(
        description = "Parse a design prompt into a structured specification with a confidence score and clarification questions. Uses the offline keyword parser."
    )]
    async fn parse_design_prompt(
        &self,
        Parameters(req): Parameters<ParsePromptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let parsed = parse_prompt(&req.prompt);
        let assessment = assess_ambiguity(&parsed.specification);
        json_result(&serde_json::json!({
            "specification": parsed.specification,
            "intent": parsed.intent,
            "assessment": assessment,
        }))
    }

    #[tool(description = "Price cache statistics per layer and result type.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        let cache = self.tools.cache().lock().await;
        let stats = cache
            .stats()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        json_result(&serde_json::json!({"layers": cache.describe(), "stats": stats}))
    }
}

#[tool_handler]
impl ServerHandler for CemServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Pricing and cost tools for mechanical design.\n\n\
                 - Use density_lookup to turn a part volume into mass, then manufacturing_cost_estimator \
                   for process cost and material_cost_calculator for raw material.\n\
                 - product_price_lookup and material_price_lookup search the web; treat low-confidence \
                   results as estimates.\n\
                 - parse_design_prompt shows how a prompt is interpreted before a design is generated."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cem_store::{CacheStore, MemoryCache};
    use tokio::sync::Mutex;

    use super::*;
    use crate::config::{CacheTtlConfig, SearchConfig};
    use crate::search::WebSearch;

    fn make_server() -> CemServer {
        let search = WebSearch::new(&SearchConfig::default()).unwrap();
        let cache = CacheStore::new(Box::new(MemoryCache::new()));
        CemServer::new(PriceTools::new(
            search,
            Arc::new(Mutex::new(cache)),
            CacheTtlConfig::default(),
        ))
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    #[tokio::test]
    async fn test_density_then_stats() {
        let server = make_server();
        let result = server
            .density_lookup(Parameters(DensityRequest {
                material_name: "titanium".into(),
                unit: "g/cm3".into(),
            }))
            .await
            .unwrap();
        assert_eq!(parse_result(&result)["density"], 4.43);

        let stats = parse_result(&server.cache_stats().await.unwrap());
        assert_eq!(stats["layers"], "memory");
        assert_eq!(stats["stats"]["primary"]["total_entries"], 1);
    }

    #[tokio::test]
    async fn test_manufacturing_estimate() {
        let server = make_server();
        let result = server
            .manufacturing_cost_estimator(Parameters(ManufacturingCostRequest {
                manufacturing_method: "cnc".into(),
                material: "aluminum".into(),
                weight_g: 50.0,
                volume_cm3: None,
                complexity: "complex".into(),
                post_processing: Some("anodizing".into()),
            }))
            .await
            .unwrap();
        let json = parse_result(&result);
        assert_eq!(json["method"], "CNC");
        assert_eq!(json["total_cost"], 130.0);
    }

    #[tokio::test]
    async fn test_parse_design_prompt() {
        let server = make_server();
        let result = server
            .parse_design_prompt(Parameters(ParsePromptRequest {
                prompt: "pan-tilt camera mount in PETG".into(),
            }))
            .await
            .unwrap();
        let json = parse_result(&result);
        assert_eq!(json["specification"]["device_type"], "pan_tilt");
        assert!(json["assessment"]["confidence"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_tool_registration() {
        let server = make_server();
        let info = server.get_info();

        assert!(info.instructions.is_some());
        assert!(info.capabilities.tools.is_some());
    }
}
