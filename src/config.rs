use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_DATA_PATH: &str = "titanic/train.csv";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

const CONFIG_DIR_NAME: &str = "tablechat";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Legacy variable some deployments use to carry the model key.
const API_KEY_ALIAS_VAR: &str = "gptoss";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub config_is_explicit: bool,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub data_path: PathBuf,
    pub static_dir: PathBuf,
    pub bind_addr: String,
    pub backend_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    data_path: Option<String>,
    static_dir: Option<String>,
    bind_addr: Option<String>,
    backend_url: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let (config_path, config_is_explicit) = match explicit_path {
            Some(path) => (path.to_path_buf(), true),
            None => (discover_config_path()?, false),
        };

        if config_is_explicit && !config_path.is_file() {
            bail!(
                "Failed to load config {}: file does not exist",
                config_path.display()
            );
        }
        let file_config = load_file_config(&config_path)?;

        dotenvy::dotenv().ok();

        let file_value = |pick: fn(&RawFileConfig) -> Option<&String>| {
            file_config
                .as_ref()
                .and_then(pick)
                .and_then(|value| non_empty(value).map(ToOwned::to_owned))
        };

        let temperature = match file_config.as_ref().and_then(|cfg| cfg.temperature) {
            Some(value) if !(0.0..=2.0).contains(&value) => {
                return Err(config_error(
                    &config_path,
                    "temperature",
                    "must be between 0.0 and 2.0",
                ));
            }
            Some(value) => value,
            None => DEFAULT_TEMPERATURE,
        };

        Ok(Self {
            api_key: env_non_empty("OPENAI_API_KEY")
                .or_else(|| env_non_empty(API_KEY_ALIAS_VAR))
                .or_else(|| file_value(|cfg| cfg.api_key.as_ref())),
            model: env_non_empty("TABLECHAT_MODEL")
                .or_else(|| file_value(|cfg| cfg.model.as_ref()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env_non_empty("TABLECHAT_BASE_URL")
                .or_else(|| file_value(|cfg| cfg.base_url.as_ref()))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
            data_path: env_non_empty("TABLECHAT_DATA")
                .or_else(|| file_value(|cfg| cfg.data_path.as_ref()))
                .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string())
                .into(),
            static_dir: env_non_empty("TABLECHAT_STATIC_DIR")
                .or_else(|| file_value(|cfg| cfg.static_dir.as_ref()))
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
                .into(),
            bind_addr: env_non_empty("TABLECHAT_BIND")
                .or_else(|| file_value(|cfg| cfg.bind_addr.as_ref()))
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            backend_url: env_non_empty("TABLECHAT_BACKEND_URL")
                .or_else(|| file_value(|cfg| cfg.backend_url.as_ref()))
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            config_path,
            config_is_explicit,
        })
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|value| non_empty(&value).map(ToOwned::to_owned))
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}
