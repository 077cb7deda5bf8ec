//! HTTP implementation of the REST collaborator.
//!
//! Endpoints live under `<base>/api/chat/conversaciones`. Names travel as the
//! `nombre` query parameter; bodies are the broker's conversation JSON.

use std::sync::Arc;

use parley_core::{Conversation, ConversationId};
use parley_proto::ConversationPayload;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::{api::ConversationApi, error::ApiError, token::TokenStore};

/// REST client for the conversation directory.
#[derive(Clone)]
pub struct HttpConversationApi {
    client: reqwest::Client,
    base: String,
    tokens: Arc<dyn TokenStore>,
}

impl HttpConversationApi {
    /// Client rooted at `api_url` (e.g. `http://localhost:8080`).
    pub fn new(api_url: &str, tokens: Arc<dyn TokenStore>) -> Self {
        Self::with_client(api_url, tokens, reqwest::Client::new())
    }

    /// Same as [`HttpConversationApi::new`] with a shared HTTP client.
    pub fn with_client(api_url: &str, tokens: Arc<dyn TokenStore>, client: reqwest::Client) -> Self {
        Self { client, base: format!("{}/api/chat/conversaciones", api_url.trim_end_matches('/')), tokens }
    }

    fn request(&self, method: Method, path: Option<ConversationId>) -> (RequestBuilder, String) {
        let url = match path {
            Some(id) => format!("{}/{id}", self.base),
            None => self.base.clone(),
        };
        let mut builder = self.client.request(method, &url);
        if let Some(token) = self.tokens.token() {
            builder = builder.bearer_auth(token);
        }
        (builder, url)
    }

    async fn send(builder: RequestBuilder, url: String) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "conversation API request failed");
            return Err(ApiError::Http { status: status.as_u16(), url });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder, url: String) -> Result<T, ApiError> {
        Self::send(builder, url).await?.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl std::fmt::Debug for HttpConversationApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConversationApi").field("base", &self.base).finish_non_exhaustive()
    }
}

impl ConversationApi for HttpConversationApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let (builder, url) = self.request(Method::GET, None);
        let payloads: Vec<ConversationPayload> = Self::json(builder, url).await?;
        Ok(payloads.into_iter().map(Conversation::from).collect())
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<Conversation, ApiError> {
        let (builder, url) = self.request(Method::GET, Some(id));
        Self::json::<ConversationPayload>(builder, url).await.map(Conversation::from)
    }

    async fn create_conversation(&self, name: &str) -> Result<Conversation, ApiError> {
        let (builder, url) = self.request(Method::POST, None);
        Self::json::<ConversationPayload>(builder.query(&[("nombre", name)]), url).await.map(Conversation::from)
    }

    async fn rename_conversation(&self, id: ConversationId, name: &str) -> Result<Conversation, ApiError> {
        let (builder, url) = self.request(Method::PUT, Some(id));
        Self::json::<ConversationPayload>(builder.query(&[("nombre", name)]), url).await.map(Conversation::from)
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ApiError> {
        let (builder, url) = self.request(Method::DELETE, Some(id));
        Self::send(builder, url).await.map(drop)
    }
}
