use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono::Duration as ChronoDuration;
use client_core::{ClientConfig, GroupingRule, DEFAULT_BASE_URL};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub page_size: usize,
    pub group_gap_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            database_url: "sqlite://./data/chat.db".into(),
            request_timeout_secs: 10,
            poll_interval_secs: 15,
            page_size: 25,
            group_gap_secs: 300,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    base_url: Option<String>,
    database_url: Option<String>,
    request_timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    page_size: Option<usize>,
    group_gap_secs: Option<i64>,
}

impl Settings {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            page_size: self.page_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            grouping: GroupingRule::SameSenderWithin(ChronoDuration::seconds(self.group_gap_secs)),
        }
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.database_url {
            self.database_url = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.poll_interval_secs {
            self.poll_interval_secs = v;
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.group_gap_secs {
            self.group_gap_secs = v;
        }
    }

    /// Later names win, so `APP__*` overrides the short form.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ["CHAT_BASE_URL", "APP__BASE_URL"] {
            if let Some(v) = lookup(key) {
                self.base_url = v;
            }
        }
        for key in ["DATABASE_URL", "APP__DATABASE_URL"] {
            if let Some(v) = lookup(key) {
                self.database_url = v;
            }
        }
        if let Some(parsed) = parse_env(&lookup, "APP__REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parsed;
        }
        if let Some(parsed) = parse_env(&lookup, "APP__POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parsed;
        }
        if let Some(parsed) = parse_env(&lookup, "APP__PAGE_SIZE") {
            self.page_size = parsed;
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse::<T>().ok())
}

/// Defaults, then the TOML file, then the environment. An explicitly named
/// file must exist; the default `chat.toml` is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let file: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            settings.apply_file(file);
        }
        Err(err) if required => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
        Err(_) => {}
    }

    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}
