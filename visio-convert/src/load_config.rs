use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};
use visio_convert_core::config::ControllerConfig;

/// Environment variable that overrides `api_url` from the config file.
pub const API_URL_ENV: &str = "VISIO_CONVERT_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_OUTPUT_DIR: &str = "converted";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Fully merged runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub controller: ControllerConfig,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct StaticConfig {
    api_url: Option<String>,
    output_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    controller: ControllerConfig,
}

/// Loads the optional YAML config file and applies the environment override
/// for the service address. Every key has a default, so no file is needed.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let static_conf = match path {
        Some(path) => read_static_config(path.as_ref())?,
        None => {
            info!("No config file given, using defaults");
            StaticConfig::default()
        }
    };

    let api_url = match std::env::var(API_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => {
            info!(env = API_URL_ENV, "Service address taken from environment");
            url.trim().to_string()
        }
        _ => static_conf
            .api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
    };

    if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
        error!(api_url = %api_url, "Service address must be an http(s) URL");
        anyhow::bail!("Invalid api_url {api_url:?}: expected an http:// or https:// URL");
    }

    if static_conf.controller.poll_interval_ms == 0 {
        error!("controller.poll_interval_ms must be positive");
        anyhow::bail!("Invalid controller.poll_interval_ms: must be greater than zero");
    }

    let config = AppConfig {
        api_url,
        output_dir: static_conf
            .output_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        request_timeout_secs: static_conf
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        controller: static_conf.controller,
    };

    info!(
        api_url = %config.api_url,
        output_dir = %config.output_dir.display(),
        request_timeout_secs = config.request_timeout_secs,
        "Config loaded and merged successfully"
    );
    config.controller.trace_loaded();
    Ok(config)
}

fn read_static_config(path: &Path) -> Result<StaticConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path, e));
        }
    };

    if content.trim().is_empty() {
        return Ok(StaticConfig::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
