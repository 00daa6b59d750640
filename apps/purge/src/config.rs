use std::{fs, io, path::Path, time::Duration};

use anyhow::{bail, Context};
use client_core::{
    ClientConfig, Credential, EngineOptions, PageFaultPolicy, DEFAULT_API_BASE_URL,
    DEFAULT_DELETE_PACING,
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "purge.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: Option<String>,
    pub api_base_url: String,
    pub delete_pacing_ms: u64,
    pub request_timeout_secs: u64,
    pub page_fault_policy: PageFaultPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: DEFAULT_API_BASE_URL.into(),
            delete_pacing_ms: DEFAULT_DELETE_PACING.as_millis() as u64,
            request_timeout_secs: 30,
            page_fault_policy: PageFaultPolicy::default(),
        }
    }
}

/// Shape of `purge.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    token: Option<String>,
    api_base_url: Option<String>,
    delete_pacing_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    page_fault_policy: Option<String>,
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_from(path, |key| std::env::var(key).ok())
}

/// Defaults, then the toml file at `path` if it exists, then environment overrides from `env`.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg)?;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file; using defaults");
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    if let Some(v) = env("PURGE_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("APP__DELETE_PACING_MS") {
        settings.delete_pacing_ms = v
            .trim()
            .parse()
            .with_context(|| format!("APP__DELETE_PACING_MS is not a number: '{v}'"))?;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v
            .trim()
            .parse()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?;
    }
    if let Some(v) = env("APP__PAGE_FAULT_POLICY") {
        settings.page_fault_policy = parse_policy(&v)?;
    }

    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) -> anyhow::Result<()> {
    if let Some(v) = file_cfg.token {
        settings.token = Some(v);
    }
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.delete_pacing_ms {
        settings.delete_pacing_ms = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.page_fault_policy {
        settings.page_fault_policy = parse_policy(&v)?;
    }
    Ok(())
}

fn parse_policy(raw: &str) -> anyhow::Result<PageFaultPolicy> {
    raw.parse::<PageFaultPolicy>().map_err(anyhow::Error::msg)
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
    let url = Url::parse(&settings.api_base_url)
        .with_context(|| format!("invalid api base url '{}'", settings.api_base_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "api base url must use http or https, got '{}'",
            settings.api_base_url
        );
    }
    if settings.request_timeout_secs == 0 {
        bail!("request timeout must be at least one second");
    }
    Ok(())
}

impl Settings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.api_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..ClientConfig::default()
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            delete_pacing: Duration::from_millis(self.delete_pacing_ms),
            page_fault_policy: self.page_fault_policy,
        }
    }

    /// `--token` / `PURGE_TOKEN` wins over the config file. Surrounding whitespace from a pasted
    /// token or a trailing newline in the file is stripped here, before the core sees it.
    pub fn credential(&self, from_cli: Option<String>) -> anyhow::Result<Credential> {
        let Some(raw) = from_cli.or_else(|| self.token.clone()) else {
            bail!("no credential: pass --token, set PURGE_TOKEN or add `token` to the config file");
        };
        Credential::new(raw.trim()).context("unusable credential")
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
