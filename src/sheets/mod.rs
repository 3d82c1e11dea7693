pub mod auth;
pub mod client;

pub use auth::{ServiceAccountAuth, ServiceAccountKey, StaticToken, TokenSource};
pub use client::{resolve_spreadsheet_id, SheetsClient};

use anyhow::{Context, Result};
use std::fs;
use std::sync::Arc;

use crate::config::SheetsConfig;

/// Authenticate with the configured service account and open the spreadsheet.
pub async fn connect(config: &SheetsConfig) -> Result<SheetsClient> {
    let key_json = match (&config.credentials_json, &config.credentials_file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path))?,
        (None, None) => anyhow::bail!("No Google credentials configured"),
    };

    let key = ServiceAccountKey::from_json(&key_json).context("Invalid service account key")?;
    let http = client::http_client()?;
    let auth: Arc<dyn TokenSource> = Arc::new(
        ServiceAccountAuth::new(key, http.clone()).context("Invalid service account key")?,
    );

    let spreadsheet_id = match (&config.spreadsheet_id, &config.spreadsheet_name) {
        (Some(id), _) => id.clone(),
        (None, Some(name)) => resolve_spreadsheet_id(&http, &config.drive_base, auth.as_ref(), name)
            .await
            .with_context(|| format!("Failed to open spreadsheet '{}'", name))?,
        (None, None) => anyhow::bail!("No spreadsheet configured"),
    };

    Ok(SheetsClient::new(http, &config.api_base, spreadsheet_id, auth))
}
