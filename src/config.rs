use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            port: std::env::var("MCPSCOPE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6277),
            data_dir: std::env::var("MCPSCOPE_DATA_DIR").ok().map(PathBuf::from),
        }
    }
}
