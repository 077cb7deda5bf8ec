//! HTTP conversation API against a mock server.

use std::sync::Arc;

use parley_client::{ApiError, ConversationApi, ConversationId, StaticToken, TokenStore, rest::HttpConversationApi};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

const BASE: &str = "/api/chat/conversaciones";

fn api(server: &MockServer, token: Option<&str>) -> HttpConversationApi {
    let tokens: Arc<dyn TokenStore> = Arc::new(token.map_or_else(StaticToken::none, StaticToken::new));
    HttpConversationApi::new(&server.uri(), tokens)
}

fn conversation(id: u64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "nombre": name,
        "fechaCreacion": "2024-05-01T10:00:00",
        "fechaActualizacion": "2024-05-01T10:05:00",
        "mensajes": null,
    })
}

#[tokio::test]
async fn lists_conversations_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(BASE))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([conversation(1, "general"), conversation(2, "ops")])))
        .expect(1)
        .mount(&server)
        .await;

    let conversations = api(&server, Some("secret")).list_conversations().await.unwrap();

    let names: Vec<_> = conversations.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["general", "ops"]);
    assert!(conversations.iter().all(|c| c.messages.is_empty()));
}

#[tokio::test]
async fn fetches_history() {
    let server = MockServer::start().await;
    let mut body = conversation(42, "general");
    body["mensajes"] = json!([{
        "id": 7,
        "conversacionId": 42,
        "userId": 3,
        "username": "ana",
        "contenido": "hola",
        "fechaEnvio": "2024-05-01T10:01:00Z",
        "leido": true,
    }]);
    Mock::given(method("GET"))
        .and(path(format!("{BASE}/42")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let conversation = api(&server, None).get_conversation(ConversationId(42)).await.unwrap();

    assert_eq!(conversation.id, ConversationId(42));
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].content, "hola");
    assert!(conversation.messages[0].read);
}

#[tokio::test]
async fn create_and_rename_pass_name_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(BASE))
        .and(query_param("nombre", "random"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conversation(5, "random")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{BASE}/5")))
        .and(query_param("nombre", "off topic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conversation(5, "off topic")))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server, None);
    let created = api.create_conversation("random").await.unwrap();
    let renamed = api.rename_conversation(created.id, "off topic").await.unwrap();

    assert_eq!(created.id, ConversationId(5));
    assert_eq!(renamed.name, "off topic");
}

#[tokio::test]
async fn delete_succeeds_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{BASE}/9")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    api(&server, None).delete_conversation(ConversationId(9)).await.unwrap();
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{BASE}/404")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = api(&server, None).get_conversation(ConversationId(404)).await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status: 404, .. }), "{err:?}");
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(BASE))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = api(&server, None).list_conversations().await.unwrap_err();

    assert!(matches!(err, ApiError::Decode(_)), "{err:?}");
}
