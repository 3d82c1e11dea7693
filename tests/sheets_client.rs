use anthranks::sheets::{resolve_spreadsheet_id, SheetsClient, StaticToken, TokenSource};
use rank_core::{Category, Cell, Rating, RetryPolicy, SheetStore, StoreClient, StoreError, VoteBook};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SheetsClient {
    let auth: Arc<dyn TokenSource> = Arc::new(StaticToken("test-token".into()));
    SheetsClient::new(reqwest::Client::new(), server.uri(), "sheet-1", auth)
}

fn google_error(status: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": { "code": status, "message": message, "status": "ERR" }
    }))
}

#[tokio::test]
async fn read_values_sends_token_and_stringifies_cells() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/spreadsheets/sheet-1/values/.*Compiled"))
        .and(query_param("valueRenderOption", "UNFORMATTED_VALUE"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Compiled!A1:D3",
            "majorDimension": "ROWS",
            "values": [
                ["dino_id", "Complexity", "Sociability", "Survivability"],
                ["Trex", 4.5, 3, "n/a"],
                ["Raptor"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let rows = client(&server).read_values("Compiled").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["Trex", "4.5", "3", "n/a"]);
    assert_eq!(rows[2], vec!["Raptor"]);
}

#[tokio::test]
async fn empty_table_has_no_values_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/spreadsheets/sheet-1/values/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Votes!A1:Z1000",
            "majorDimension": "ROWS"
        })))
        .mount(&server)
        .await;

    assert!(client(&server).read_values("Votes").await.unwrap().is_empty());
}

#[tokio::test]
async fn statuses_map_onto_store_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"Votes"))
        .respond_with(google_error(429, "Quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"Compiled"))
        .respond_with(google_error(503, "The service is currently unavailable."))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"Metadata"))
        .respond_with(google_error(400, "Unable to parse range: 'Metadata'"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"Private"))
        .respond_with(google_error(403, "The caller does not have permission"))
        .mount(&server)
        .await;

    let sheets = client(&server);
    assert_eq!(sheets.read_values("Votes").await, Err(StoreError::RateLimited));

    let server_err = sheets.read_values("Compiled").await.unwrap_err();
    assert!(server_err.is_transient());
    assert!(matches!(server_err, StoreError::Server { status: 503, .. }));

    assert_eq!(
        sheets.read_values("Metadata").await,
        Err(StoreError::MissingTable("Metadata".into()))
    );

    let rejected = sheets.read_values("Private").await.unwrap_err();
    assert_eq!(
        rejected,
        StoreError::Rejected {
            status: 403,
            message: "The caller does not have permission".into()
        }
    );
    assert!(!rejected.is_transient());
}

#[tokio::test]
async fn append_returns_row_from_updated_range() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"Votes.*:append$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_json(json!({
            "majorDimension": "ROWS",
            "values": [["Trex", "42", "", "", ""]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "sheet-1",
            "updates": { "updatedRange": "Votes!A17:E17", "updatedRows": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let row = client(&server)
        .append_row(
            "Votes",
            &[Cell::text("Trex"), Cell::text("42"), Cell::Empty, Cell::Empty, Cell::Empty],
        )
        .await
        .unwrap();
    assert_eq!(row, 17);
}

#[tokio::test]
async fn update_cell_targets_a1_address() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"Votes%27%21D5$"))
        .and(body_json(json!({
            "range": "'Votes'!D5",
            "majorDimension": "ROWS",
            "values": [[4]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_cell("Votes", 5, 4, &Cell::Int(4))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_table_is_created_with_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spreadsheets/sheet-1"))
        .and(query_param("fields", "sheets.properties.title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sheets": [{ "properties": { "title": "Votes" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/spreadsheets/sheet-1:batchUpdate"))
        .and(body_json(json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": "Metadata",
                        "gridProperties": { "rowCount": 1000, "columnCount": 4 }
                    }
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "replies": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"Metadata%27%21A1$"))
        .and(body_json(json!({
            "range": "'Metadata'!A1",
            "majorDimension": "ROWS",
            "values": [["Thread ID", "dino_id", "rate_message_id", "results_message_id"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 4 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = StoreClient::new(Arc::new(client(&server)));
    let status = store
        .write()
        .await
        .ensure_table("Metadata", &rank_core::schema::METADATA_HEADER)
        .await
        .unwrap();
    assert_eq!(status, rank_core::store::HeaderStatus::Created);
}

#[tokio::test]
async fn vote_upsert_retries_through_quota_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"Votes"))
        .respond_with(google_error(429, "Quota exceeded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"Votes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["dino_id", "user_id", "Complexity", "Sociability", "Survivability"]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r":append$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updates": { "updatedRange": "Votes!A2:E2" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"Votes%27%21C2$"))
        .and(body_json(json!({
            "range": "'Votes'!C2",
            "majorDimension": "ROWS",
            "values": [[5]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(StoreClient::new(Arc::new(client(&server))));
    let votes = VoteBook::new(store, RetryPolicy::new(3, Duration::from_millis(10)));
    let write = votes
        .upsert("Trex", "42", Category::Complexity, Rating::new(5).unwrap())
        .await
        .unwrap();
    assert_eq!(write.row, 2);
    assert!(write.created);
}

#[tokio::test]
async fn spreadsheet_is_resolved_by_name_through_drive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param(
            "q",
            "name = 'Dino Ratings' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{ "id": "abc123", "name": "Dino Ratings" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let auth = StaticToken("test-token".into());
    let id = resolve_spreadsheet_id(&http, &server.uri(), &auth, "Dino Ratings")
        .await
        .unwrap();
    assert_eq!(id, "abc123");

    let missing = resolve_spreadsheet_id(&http, &server.uri(), &auth, "Nope").await;
    assert!(matches!(missing, Err(StoreError::Rejected { status: 404, .. })));
}
