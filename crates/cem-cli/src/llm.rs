//! Ollama client used to turn prompts into specifications, with the keyword
//! parser as the fallback.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::json;

use cem_core::parser::LLM_SYSTEM_PROMPT;
use cem_core::{DesignSpecification, IntentAnalysis, parse_prompt, spec_from_llm_output};

use crate::config::LlmConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One-shot completion. With `json_format` the model is constrained to
    /// emit a JSON document.
    pub async fn generate(&self, prompt: &str, system: Option<&str>, json_format: bool) -> Result<String> {
        let mut body = json!({"model": self.model, "prompt": prompt, "stream": false});
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if json_format {
            body["format"] = json!("json");
        }
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .context("failed to reach Ollama")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Ollama returned {status}: {text}");
        }
        let parsed: GenerateResponse = resp.json().await.context("invalid Ollama response")?;
        Ok(parsed.response)
    }

    pub async fn chat(&self, messages: &[ChatMessage], json_format: bool) -> Result<ChatMessage> {
        let mut body = json!({"model": self.model, "messages": messages, "stream": false});
        if json_format {
            body["format"] = json!("json");
        }
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .context("failed to reach Ollama")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Ollama returned {status}: {text}");
        }
        let parsed: ChatResponse = resp.json().await.context("invalid Ollama response")?;
        Ok(parsed.message)
    }

    /// True when the server answers its model listing.
    pub async fn is_available(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecSource {
    Llm,
    Keywords,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedDesign {
    pub specification: DesignSpecification,
    /// Keyword intent is always computed; it drives the goal fields.
    pub intent: IntentAnalysis,
    pub source: SpecSource,
}

/// Extract a specification with the LLM when one is configured, falling back
/// to the keyword parser on any failure.
pub async fn parse_design(llm: Option<&OllamaClient>, prompt: &str) -> ParsedDesign {
    let keywords = parse_prompt(prompt);
    let Some(client) = llm else {
        return ParsedDesign {
            specification: keywords.specification,
            intent: keywords.intent,
            source: SpecSource::Keywords,
        };
    };

    let from_llm = match client.generate(prompt, Some(LLM_SYSTEM_PROMPT), true).await {
        Ok(raw) => spec_from_llm_output(&raw).map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    match from_llm {
        Ok(mut spec) => {
            tracing::info!(model = client.model(), device = %spec.device_type, "specification from LLM");
            if spec.optimization_goals.is_empty() {
                spec.optimization_goals = keywords.specification.optimization_goals.clone();
            }
            ParsedDesign {
                specification: spec,
                intent: keywords.intent,
                source: SpecSource::Llm,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM extraction failed, using keyword parser");
            ParsedDesign {
                specification: keywords.specification,
                intent: keywords.intent,
                source: SpecSource::Keywords,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;
    use cem_core::DeviceType;

    fn client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(&LlmConfig {
            base_url: server.base_url(),
            timeout_secs: 5,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_sends_json_format() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"model": "aurora", "format": "json", "stream": false}"#);
                then.status(200)
                    .json_body(json!({"model": "aurora", "response": "{\"ok\": true}", "done": true}));
            })
            .await;
        let out = client(&server).generate("hi", Some("sys"), true).await.unwrap();
        assert_eq!(out, "{\"ok\": true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("model not loaded");
            })
            .await;
        let msgs = [ChatMessage {
            role: "user".into(),
            content: "hi".into(),
        }];
        let err = client(&server).chat(&msgs, false).await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_parse_design_uses_llm_output() {
        let server = MockServer::start_async().await;
        let spec = json!({
            "device_type": "gripper",
            "materials": ["PETG"],
        });
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({"response": spec.to_string()}));
            })
            .await;
        let c = client(&server);
        let parsed = parse_design(Some(&c), "a lightweight robot arm").await;
        assert_eq!(parsed.source, SpecSource::Llm);
        assert_eq!(parsed.specification.device_type, DeviceType::Gripper);
        assert_eq!(parsed.intent.detected_device_type, DeviceType::RobotArm);
    }

    #[tokio::test]
    async fn test_parse_design_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({"response": "not json at all"}));
            })
            .await;
        let c = client(&server);
        let parsed = parse_design(Some(&c), "a small drone frame").await;
        assert_eq!(parsed.source, SpecSource::Keywords);

        let offline = parse_design(None, "a small drone frame").await;
        assert_eq!(offline.source, SpecSource::Keywords);
        assert_eq!(offline.specification.device_type, parsed.specification.device_type);
    }
}
