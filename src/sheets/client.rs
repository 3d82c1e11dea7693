//! Google Sheets v4 REST backend for [`SheetStore`].

use async_trait::async_trait;
use rank_core::{Cell, SheetStore, StoreError};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::auth::TokenSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

pub fn http_client() -> Result<Client, StoreError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| StoreError::Transport(e.to_string()))
}

/// One spreadsheet, addressed by id, whose tabs are the store's tables.
pub struct SheetsClient {
    http: Client,
    api_base: String,
    spreadsheet_id: String,
    auth: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct DriveFiles {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

impl SheetsClient {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        auth: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            auth,
        }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/spreadsheets/{}", self.api_base, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), urlencoding::encode(range))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Response, StoreError> {
        let token = self.auth.token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token).query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        check(response).await
    }

    async fn send_range(
        &self,
        method: Method,
        table: &str,
        range: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Response, StoreError> {
        match self.send(method, &self.values_url(range), query, body).await {
            Err(e) if is_missing_range(&e) => Err(StoreError::MissingTable(table.to_string())),
            other => other,
        }
    }
}

/// Look a spreadsheet up by exact name through the Drive files search.
pub async fn resolve_spreadsheet_id(
    http: &Client,
    drive_base: &str,
    auth: &dyn TokenSource,
    name: &str,
) -> Result<String, StoreError> {
    let token = auth.token().await?;
    let query = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        name.replace('\\', "\\\\").replace('\'', "\\'"),
        SPREADSHEET_MIME
    );
    let url = format!("{}/files", drive_base.trim_end_matches('/'));
    let response = http
        .get(url)
        .bearer_auth(token)
        .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
        .send()
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?;
    let files: DriveFiles = json_body(check(response).await?).await?;

    let Some(file) = files.files.into_iter().next() else {
        return Err(StoreError::Rejected {
            status: 404,
            message: format!("spreadsheet '{}' not found or not shared with the service account", name),
        });
    };
    info!("Resolved spreadsheet '{}' to {}", file.name, file.id);
    Ok(file.id)
}

async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("Sheets request failed with {}: {}", status, body);
    Err(StoreError::from_status(status.as_u16(), error_message(&body)))
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, StoreError> {
    response
        .json()
        .await
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Google wraps errors as `{"error": {"message": ..}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn is_missing_range(err: &StoreError) -> bool {
    match err {
        StoreError::Rejected { status: 404, .. } => true,
        StoreError::Rejected { status: 400, message } => message.contains("Unable to parse range"),
        _ => false,
    }
}

fn quoted(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

/// 1-based column index to A1 letters.
pub fn column_letter(mut column: usize) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push(b'A' + rem as u8);
        column = (column - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Row number from an A1 range such as `'Votes'!A7:E7`.
pub fn parse_updated_row(range: &str) -> Option<usize> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let first = cells.split(':').next()?;
    let digits: String = first.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    digits.parse().ok().filter(|row| *row > 0)
}

fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::String(String::new()),
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Int(n) => json!(n),
    }
}

fn row_values(values: &[Cell]) -> Value {
    json!([values.iter().map(cell_value).collect::<Vec<_>>()])
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}

fn text_rows(range: ValueRange) -> Vec<Vec<String>> {
    range
        .values
        .iter()
        .map(|row| row.iter().map(value_text).collect())
        .collect()
}

const READ_QUERY: [(&str, &str); 2] = [
    ("valueRenderOption", "UNFORMATTED_VALUE"),
    ("majorDimension", "ROWS"),
];

const RAW_WRITE: [(&str, &str); 1] = [("valueInputOption", "RAW")];

#[async_trait]
impl SheetStore for SheetsClient {
    async fn has_table(&self, table: &str) -> Result<bool, StoreError> {
        let response = self
            .send(
                Method::GET,
                &self.spreadsheet_url(),
                &[("fields", "sheets.properties.title")],
                None,
            )
            .await?;
        let info: SpreadsheetInfo = json_body(response).await?;
        Ok(info.sheets.iter().any(|s| s.properties.title == table))
    }

    async fn create_table(&self, table: &str, rows: usize, columns: usize) -> Result<(), StoreError> {
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": table,
                        "gridProperties": { "rowCount": rows, "columnCount": columns }
                    }
                }
            }]
        });
        let url = format!("{}:batchUpdate", self.spreadsheet_url());
        self.send(Method::POST, &url, &[], Some(body)).await?;
        info!("Created sheet tab '{}'", table);
        Ok(())
    }

    async fn read_values(&self, table: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let response = self
            .send_range(Method::GET, table, &quoted(table), &READ_QUERY, None)
            .await?;
        Ok(text_rows(json_body(response).await?))
    }

    async fn read_row(&self, table: &str, row: usize) -> Result<Vec<String>, StoreError> {
        let range = format!("{}!{row}:{row}", quoted(table));
        let response = self
            .send_range(Method::GET, table, &range, &READ_QUERY, None)
            .await?;
        Ok(text_rows(json_body(response).await?).into_iter().next().unwrap_or_default())
    }

    async fn write_row(&self, table: &str, row: usize, values: &[Cell]) -> Result<(), StoreError> {
        let range = format!("{}!A{row}", quoted(table));
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": row_values(values) });
        self.send_range(Method::PUT, table, &range, &RAW_WRITE, Some(body))
            .await?;
        Ok(())
    }

    async fn append_row(&self, table: &str, values: &[Cell]) -> Result<usize, StoreError> {
        let range = format!("{}!A1", quoted(table));
        let url = format!("{}:append", self.values_url(&range));
        let body = json!({ "majorDimension": "ROWS", "values": row_values(values) });
        let response = match self
            .send(
                Method::POST,
                &url,
                &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
                Some(body),
            )
            .await
        {
            Err(e) if is_missing_range(&e) => return Err(StoreError::MissingTable(table.to_string())),
            other => other?,
        };

        let appended: AppendResponse = json_body(response).await?;
        parse_updated_row(&appended.updates.updated_range).ok_or_else(|| {
            StoreError::Malformed(format!(
                "unexpected updated range '{}'",
                appended.updates.updated_range
            ))
        })
    }

    async fn update_cell(
        &self,
        table: &str,
        row: usize,
        column: usize,
        value: &Cell,
    ) -> Result<(), StoreError> {
        let range = format!("{}!{}{row}", quoted(table), column_letter(column));
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": [[cell_value(value)]] });
        self.send_range(Method::PUT, table, &range, &RAW_WRITE, Some(body))
            .await?;
        Ok(())
    }
}
