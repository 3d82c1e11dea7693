use anthranks::discord::interaction;
use anthranks::{Bot, Config};
use rank_core::schema::{COMPILED_TABLE, METADATA_TABLE, VOTES_HEADER, VOTES_TABLE};
use rank_core::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn row(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.discord.token = Some("bot-token".into());
    config.discord.api_base = server.uri();
    config
}

async fn bot_with_store(server: &MockServer) -> (Arc<MemoryStore>, Bot) {
    let backend = Arc::new(MemoryStore::new());
    backend.insert_table(VOTES_TABLE, vec![row(&VOTES_HEADER)]);
    backend.insert_table(
        COMPILED_TABLE,
        vec![
            row(&["dino_id", "Complexity", "Sociability", "Survivability"]),
            row(&["Trex", "4.5", "3", "2"]),
        ],
    );
    let bot = Bot::from_parts(config(server), backend.clone()).unwrap();
    bot.state().prepare_store().await.unwrap();
    (backend, bot)
}

async fn expect_deferred_then_followup(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/interactions/1/tok/callback"))
        .and(body_partial_json(json!({ "type": 5, "data": { "flags": 64 } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhooks/2/tok"))
        .and(body_partial_json(json!({ "content": content, "flags": 64 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1", "channel_id": "300" })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn prepare_store_creates_metadata_table() {
    let server = MockServer::start().await;
    let (backend, _bot) = bot_with_store(&server).await;
    assert_eq!(
        backend.rows(METADATA_TABLE),
        vec![row(&["Thread ID", "dino_id", "rate_message_id", "results_message_id"])]
    );
}

#[tokio::test]
async fn dropdown_selection_records_vote_and_confirms() {
    let server = MockServer::start().await;
    let (backend, bot) = bot_with_store(&server).await;
    expect_deferred_then_followup(&server, "You rated **Trex** • Sociability • 4").await;

    let selection = interaction::parse(json!({
        "id": "1", "application_id": "2", "type": 3, "token": "tok",
        "channel_id": "300",
        "member": { "user": { "id": "42" } },
        "data": { "custom_id": "rate_select:Trex:Sociability", "component_type": 3, "values": ["4"] }
    }))
    .unwrap();
    bot.state().handle_interaction(selection).await;

    assert_eq!(backend.rows(VOTES_TABLE)[1], row(&["Trex", "42", "", "4", ""]));
}

#[tokio::test]
async fn unknown_control_is_rejected_without_store_access() {
    let server = MockServer::start().await;
    let (backend, bot) = bot_with_store(&server).await;
    Mock::given(method("POST"))
        .and(path("/interactions/1/tok/callback"))
        .and(body_partial_json(json!({ "type": 4, "data": { "flags": 64 } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let selection = interaction::parse(json!({
        "id": "1", "application_id": "2", "type": 3, "token": "tok",
        "user": { "id": "42" },
        "data": { "custom_id": "rate_select:Trex:Complexity", "values": ["9"] }
    }))
    .unwrap();
    bot.state().handle_interaction(selection).await;

    assert_eq!(backend.rows(VOTES_TABLE).len(), 1);
}

#[tokio::test]
async fn results_command_posts_embed_and_persists_metadata() {
    let server = MockServer::start().await;
    let (backend, bot) = bot_with_store(&server).await;
    Mock::given(method("GET"))
        .and(path("/channels/300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "300", "type": 0 })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/channels/300/messages"))
        .and(body_partial_json(json!({ "embeds": [{ "title": "Trex Rating" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "900", "channel_id": "300" })))
        .expect(1)
        .mount(&server)
        .await;
    expect_deferred_then_followup(&server, "✅ Posted ratings for **Trex** in <#300>.").await;

    let command = interaction::parse(json!({
        "id": "1", "application_id": "2", "type": 2, "token": "tok",
        "channel_id": "300",
        "member": { "user": { "id": "42" } },
        "data": { "name": "results", "options": [{ "name": "dino", "type": 3, "value": "Trex" }] }
    }))
    .unwrap();
    bot.state().handle_interaction(command).await;

    assert_eq!(backend.rows(METADATA_TABLE)[1], row(&["300", "Trex", "", "900"]));
    assert_eq!(bot.state().service.tracker().len(), 1);
}

#[tokio::test]
async fn malformed_thread_id_gets_validation_reply() {
    let server = MockServer::start().await;
    let (_backend, bot) = bot_with_store(&server).await;
    expect_deferred_then_followup(&server, "❌ `thread_id` digits only").await;

    let command = interaction::parse(json!({
        "id": "1", "application_id": "2", "type": 2, "token": "tok",
        "channel_id": "300",
        "member": { "user": { "id": "42" } },
        "data": { "name": "results", "options": [{ "name": "thread_id", "type": 3, "value": "12ab" }] }
    }))
    .unwrap();
    bot.state().handle_interaction(command).await;
}
