use std::{collections::HashMap, fs, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;
use session::ConsistencyMode;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub data_dir: PathBuf,
    pub store_base_url: String,
    pub store_token: Option<String>,
    pub sheet_name: String,
    pub flush_threshold: usize,
    pub fresh_reads: bool,
}

impl Settings {
    pub fn consistency_mode(&self) -> ConsistencyMode {
        if self.fresh_reads {
            ConsistencyMode::FreshRead
        } else {
            ConsistencyMode::CachedRead
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8088".into(),
            data_dir: PathBuf::from("sample"),
            store_base_url: "http://127.0.0.1:9400/".into(),
            store_token: None,
            sheet_name: "Sheet1".into(),
            flush_threshold: 5,
            fresh_reads: true,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("survey.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr").and_then(|v| v.as_str()) {
                settings.server_bind = v.to_string();
            }
            if let Some(v) = file_cfg.get("data_dir").and_then(|v| v.as_str()) {
                settings.data_dir = PathBuf::from(v);
            }
            if let Some(v) = file_cfg.get("store_base_url").and_then(|v| v.as_str()) {
                settings.store_base_url = v.to_string();
            }
            if let Some(v) = file_cfg.get("store_token").and_then(|v| v.as_str()) {
                settings.store_token = Some(v.to_string());
            }
            if let Some(v) = file_cfg.get("sheet_name").and_then(|v| v.as_str()) {
                settings.sheet_name = v.to_string();
            }
            if let Some(v) = file_cfg.get("flush_threshold").and_then(|v| v.as_integer()) {
                if v > 0 {
                    settings.flush_threshold = v as usize;
                }
            }
            if let Some(v) = file_cfg.get("fresh_reads").and_then(|v| v.as_bool()) {
                settings.fresh_reads = v;
            }
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("APP__DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }

    if let Ok(v) = std::env::var("STORE_BASE_URL") {
        settings.store_base_url = v;
    }
    if let Ok(v) = std::env::var("APP__STORE_BASE_URL") {
        settings.store_base_url = v;
    }

    if let Ok(v) = std::env::var("APP__STORE_TOKEN") {
        settings.store_token = Some(v);
    }

    if let Ok(v) = std::env::var("APP__SHEET_NAME") {
        settings.sheet_name = v;
    }

    if let Ok(v) = std::env::var("APP__FLUSH_THRESHOLD") {
        if let Ok(parsed) = v.parse::<usize>() {
            if parsed > 0 {
                settings.flush_threshold = parsed;
            }
        }
    }

    if let Ok(v) = std::env::var("APP__FRESH_READS") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.fresh_reads = parsed;
        }
    }

    settings
}

pub fn validate_data_dir(settings: &Settings) -> anyhow::Result<()> {
    let metadata = fs::metadata(&settings.data_dir).with_context(|| {
        format!(
            "data directory '{}' does not exist or is not readable",
            settings.data_dir.display()
        )
    })?;
    anyhow::ensure!(
        metadata.is_dir(),
        "data directory '{}' is not a directory",
        settings.data_dir.display()
    );
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
