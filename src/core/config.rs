use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Filesystem layout for one installation.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub index_db_path: PathBuf,
    pub history_db_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::rooted_at(data_dir)
    }

    /// All paths derived from one data directory. Used by tests with a tempdir.
    pub fn rooted_at(data_dir: PathBuf) -> Self {
        let docs_dir = data_dir.join("docs");
        let log_dir = data_dir.join("logs");
        let index_db_path = data_dir.join("index.db");
        let history_db_path = data_dir.join("history.db");

        for dir in [&data_dir, &docs_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            docs_dir,
            log_dir,
            index_db_path,
            history_db_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("DOCENT_DATA_DIR") {
        return PathBuf::from(dir);
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
}

/// Runtime configuration, loaded from `docent.toml` when present.
/// Every field has a default so a missing file is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint (LM Studio).
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    /// Generation temperature. Low: RAG answers should stay close to the sources.
    pub temperature: f64,
    /// Short timeout for the routing classification call.
    pub route_timeout_secs: u64,
    /// Long timeout for generation; local inference can be slow.
    pub generate_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// "flash" (similarity only) or "pro" (rerank on top).
    pub mode: String,
    pub rerank: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { port: 8750 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "local-model".to_string(),
            embedding_model: "text-embedding-all-minilm-l6-v2".to_string(),
            temperature: 0.1,
            route_timeout_secs: 8,
            generate_timeout_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            mode: "flash".to_string(),
            rerank: true,
        }
    }
}

impl Config {
    /// Loads `docent.toml` from the data dir, falling back to defaults.
    /// `DOCENT_BASE_URL` overrides the endpoint either way.
    pub fn load(paths: &AppPaths) -> Config {
        let mut config = Self::read_file(&paths.data_dir.join("docent.toml"));

        if let Ok(url) = env::var("DOCENT_BASE_URL") {
            config.llm.base_url = url;
        }

        config.llm.base_url = config.llm.base_url.trim_end_matches('/').to_string();
        config
    }

    fn read_file(path: &Path) -> Config {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("Invalid {}: {} (using defaults)", path.display(), err);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }
}
