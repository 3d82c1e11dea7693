use anyhow::{Context, Result};
use rank_core::{RetryPolicy, StarGlyphs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stars: StarGlyphs,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiscordConfig {
    /// Bot token. Falls back to `DISCORD_TOKEN`.
    pub token: Option<String>,
    /// Register commands for this guild only. Falls back to `GUILD_ID`.
    pub guild_id: Option<u64>,
    #[serde(default = "default_discord_api")]
    pub api_base: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SheetsConfig {
    /// Falls back to `SPREADSHEET_ID`.
    pub spreadsheet_id: Option<String>,
    /// Looked up through Drive when no id is set. Falls back to `SHEET_NAME`.
    pub spreadsheet_name: Option<String>,
    /// Path to a service-account key file.
    pub credentials_file: Option<String>,
    /// Inline service-account JSON, taken from `GOOGLE_CREDENTIALS_JSON`.
    #[serde(skip)]
    pub credentials_json: Option<String>,
    #[serde(default = "default_sheets_api")]
    pub api_base: String,
    #[serde(default = "default_drive_api")]
    pub drive_base: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            guild_id: None,
            api_base: default_discord_api(),
            gateway_url: default_gateway_url(),
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            spreadsheet_name: None,
            credentials_file: None,
            credentials_json: None,
            api_base: default_sheets_api(),
            drive_base: default_drive_api(),
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_discord_api() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_sheets_api() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_drive_api() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    45 * 60
}

fn default_refresh_interval_secs() -> u64 {
    45 * 60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load `path` if it exists, otherwise start from defaults, then fill
    /// unset values from the environment.
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let mut config = if Path::new(expanded.as_ref()).exists() {
            let content = fs::read_to_string(expanded.as_ref())
                .with_context(|| format!("Failed to read config file: {}", path))?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.expand_paths();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML config")
    }

    /// Environment values only fill fields the file left empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.discord.token.is_none() {
            self.discord.token = lookup("DISCORD_TOKEN");
        }
        if self.discord.guild_id.is_none() {
            // GUILD_ID=0 means "no guild", as does an unparsable value.
            self.discord.guild_id = lookup("GUILD_ID")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|id| *id != 0);
        }
        if self.sheets.spreadsheet_id.is_none() {
            self.sheets.spreadsheet_id = lookup("SPREADSHEET_ID");
        }
        if self.sheets.spreadsheet_name.is_none() {
            self.sheets.spreadsheet_name = lookup("SHEET_NAME");
        }
        if self.sheets.credentials_json.is_none() {
            self.sheets.credentials_json = lookup("GOOGLE_CREDENTIALS_JSON");
        }
    }

    pub fn expand_paths(&mut self) {
        if let Some(path) = &self.sheets.credentials_file {
            self.sheets.credentials_file = Some(shellexpand::tilde(path).to_string());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.discord.token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            anyhow::bail!("Discord token is not set (discord.token or DISCORD_TOKEN)");
        }

        if self.sheets.spreadsheet_id.is_none() && self.sheets.spreadsheet_name.is_none() {
            anyhow::bail!(
                "No spreadsheet configured (sheets.spreadsheet_id / SPREADSHEET_ID or sheets.spreadsheet_name / SHEET_NAME)"
            );
        }

        if self.sheets.credentials_json.is_none() && self.sheets.credentials_file.is_none() {
            anyhow::bail!(
                "No Google credentials (GOOGLE_CREDENTIALS_JSON or sheets.credentials_file)"
            );
        }

        if !self.discord.gateway_url.starts_with("wss://") && !self.discord.gateway_url.starts_with("ws://") {
            anyhow::bail!("Gateway URL must start with ws:// or wss://");
        }

        for (name, url) in [
            ("Discord API", &self.discord.api_base),
            ("Sheets API", &self.sheets.api_base),
            ("Drive API", &self.sheets.drive_base),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} URL must start with http:// or https://", name);
            }
        }

        if self.results.cache_ttl_secs == 0 {
            anyhow::bail!("results.cache_ttl_secs must be positive");
        }
        if self.results.refresh_interval_secs == 0 {
            anyhow::bail!("results.refresh_interval_secs must be positive");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if [&self.stars.full, &self.stars.half, &self.stars.empty]
            .iter()
            .any(|g| g.is_empty())
        {
            anyhow::bail!("Star glyphs must not be empty");
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.results.cache_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.results.refresh_interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
        )
    }
}
