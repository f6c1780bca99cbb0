//! Runtime configuration: defaults, then an optional TOML file, then
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cem_store::cache::{
    TTL_CURRENCY_SECS, TTL_DENSITY_SECS, TTL_MANUFACTURING_SECS, TTL_MATERIAL_SECS,
    TTL_PRODUCT_SECS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    /// Directory holding the PicoGK C# project (`*.csproj`).
    pub csharp_project_path: PathBuf,
    pub output_dir: PathBuf,
    pub database_url: String,
    /// When set, an in-process cache layer sits in front of SQLite.
    pub redis_url: Option<String>,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub cache_ttl: CacheTtlConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_results: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub product_secs: u64,
    pub material_secs: u64,
    pub density_secs: u64,
    pub manufacturing_secs: u64,
    pub currency_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub dotnet: String,
    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".into(),
            csharp_project_path: PathBuf::from("csharp_runtime/RobotCEM"),
            output_dir: PathBuf::from("outputs"),
            database_url: "sqlite://cem.db".into(),
            redis_url: None,
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://html.duckduckgo.com/html/".into(),
            timeout_secs: 30,
            max_results: 5,
            user_agent: concat!("cem/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".into(),
            model: "aurora".into(),
            timeout_secs: 120,
        }
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            product_secs: TTL_PRODUCT_SECS,
            material_secs: TTL_MATERIAL_SECS,
            density_secs: TTL_DENSITY_SECS,
            manufacturing_secs: TTL_MANUFACTURING_SECS,
            currency_secs: TTL_CURRENCY_SECS,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dotnet: "dotnet".into(),
            build_timeout_secs: 600,
            run_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Resolve from `path` (or `CEM_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("CEM_CONFIG").ok().map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(env_path);

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|k| std::env::var(k).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay environment variables. Empty values are ignored; unparsable
    /// numbers are logged and skipped.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CEM_BIND") {
            self.bind = v;
        }
        if let Some(v) = get("CSHARP_PROJECT_PATH") {
            self.csharp_project_path = PathBuf::from(v);
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = get("REDIS_URL") {
            self.redis_url = Some(v);
        }
        if let Some(v) = get("CEM_SEARCH_URL") {
            self.search.base_url = v;
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.llm.model = v;
        }

        let numeric = [
            ("TOOL_SEARCH_TIMEOUT", &mut self.search.timeout_secs),
            ("TOOL_CACHE_PRODUCT_TTL", &mut self.cache_ttl.product_secs),
            ("TOOL_CACHE_MATERIAL_TTL", &mut self.cache_ttl.material_secs),
            ("TOOL_CACHE_DENSITY_TTL", &mut self.cache_ttl.density_secs),
            ("TOOL_CACHE_MFG_TTL", &mut self.cache_ttl.manufacturing_secs),
            ("TOOL_CACHE_CURRENCY_TTL", &mut self.cache_ttl.currency_secs),
        ];
        for (key, slot) in numeric {
            if let Some(v) = get(key) {
                match v.trim().parse() {
                    Ok(n) => *slot = n,
                    Err(_) => tracing::warn!(key, value = %v, "ignoring non-numeric setting"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.bind, "127.0.0.1:8000");
        assert_eq!(c.search.timeout_secs, 30);
        assert_eq!(c.cache_ttl.density_secs, 604_800);
        assert_eq!(c.executor.run_timeout_secs, 300);
        assert!(c.redis_url.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = Config::from_toml(
            r#"
            output_dir = "/tmp/cem-out"

            [search]
            max_results = 8

            [cache_ttl]
            product_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(c.output_dir, PathBuf::from("/tmp/cem-out"));
        assert_eq!(c.search.max_results, 8);
        assert_eq!(c.search.timeout_secs, 30);
        assert_eq!(c.cache_ttl.product_secs, 60);
        assert_eq!(c.cache_ttl.material_secs, 7_200);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(Config::from_toml("bind = [").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut c = Config::from_toml("database_url = \"file.db\"\nbind = \"0.0.0.0:9000\"").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", ":memory:"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("OLLAMA_MODEL", "llama3"),
            ("TOOL_CACHE_PRODUCT_TTL", "120"),
            ("TOOL_SEARCH_TIMEOUT", "soon"),
            ("CEM_BIND", ""),
        ]);
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(c.database_url, ":memory:");
        assert_eq!(c.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(c.llm.model, "llama3");
        assert_eq!(c.cache_ttl.product_secs, 120);
        assert_eq!(c.search.timeout_secs, 30, "unparsable value is skipped");
        assert_eq!(c.bind, "0.0.0.0:9000", "empty value is ignored");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cem.toml");
        std::fs::write(&path, "[llm]\nenabled = false\n").unwrap();
        let c = Config::from_file(&path).unwrap();
        assert!(!c.llm.enabled);
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
