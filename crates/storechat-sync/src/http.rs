use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::trace;

use storechat_types::api::{CreateRoomRequest, CreateRoomResponse, HistoryItem, RoomListItem};
use storechat_types::models::RoomId;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::rest::RoomsApi;

/// [`RoomsApi`] over the storefront's HTTP endpoints.
#[derive(Clone)]
pub struct HttpRoomsApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRoomsApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.api_url.clone(), config.token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let resp = self.authorize(request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Status { status, body });
        }
        Ok(resp)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.execute(request).await?.text().await?;
        trace!("Response body: {}", body.chars().take(200).collect::<String>());
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RoomsApi for HttpRoomsApi {
    async fn list_rooms(&self, limit: u32) -> Result<Vec<RoomListItem>> {
        let request = self
            .client
            .get(self.url("/rooms/mine"))
            .query(&[("limit", limit)]);
        self.fetch_json(request).await
    }

    async fn history(&self, room_id: RoomId, limit: u32) -> Result<Vec<HistoryItem>> {
        let request = self
            .client
            .get(self.url("/history"))
            .query(&[("room", room_id), ("limit", i64::from(limit))]);
        self.fetch_json(request).await
    }

    async fn create_room(&self, request: &CreateRoomRequest) -> Result<CreateRoomResponse> {
        let request = self
            .client
            .post(self.url("/rooms"))
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(request)?);
        self.fetch_json(request).await
    }

    async fn mark_read(&self, room_id: RoomId) -> Result<()> {
        let request = self
            .client
            .patch(self.url(&format!("/rooms/{}/read", room_id)));
        self.execute(request).await?;
        Ok(())
    }
}
