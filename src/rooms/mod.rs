// src/rooms/mod.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::RoomProviderConfig;

/// Provisioned media room for a call. Everything about it is best-effort:
/// a missing or failed room degrades the call to signaling only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSession {
    pub room_id: String,
    pub room_name: String,
    pub room_code: Option<String>,
    pub auth_token: Option<String>,
}

#[async_trait]
pub trait RoomProvider: Send + Sync {
    /// Returns None on any failure; callers proceed without a room.
    async fn create_room(&self, name: &str) -> Option<RoomSession>;

    async fn end_room(&self, room_id: &str);
}

/// Room provider used when no credentials are configured and in tests.
pub struct NoopRoomProvider;

#[async_trait]
impl RoomProvider for NoopRoomProvider {
    async fn create_room(&self, _name: &str) -> Option<RoomSession> {
        None
    }

    async fn end_room(&self, _room_id: &str) {}
}

/// 100ms-style management-API client: create a room from a template, mint a
/// join code and a room token. Any HTTP failure is logged and swallowed.
pub struct HttpRoomProvider {
    client: reqwest::Client,
    config: RoomProviderConfig,
}

impl HttpRoomProvider {
    pub fn new(config: RoomProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn provision(&self, name: &str) -> anyhow::Result<RoomSession> {
        let room: serde_json::Value = self
            .client
            .post(format!("{}/rooms", self.config.api_base))
            .bearer_auth(&self.config.management_token)
            .json(&json!({
                "name": name,
                "description": "huddle call room",
                "template_id": self.config.template_id,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let room_id = room["id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("room id missing in response"))?
            .to_string();

        let code: serde_json::Value = self
            .client
            .post(format!("{}/room-codes/room/{}", self.config.api_base, room_id))
            .bearer_auth(&self.config.management_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token: serde_json::Value = self
            .client
            .post(format!("{}/room-tokens", self.config.api_base))
            .bearer_auth(&self.config.management_token)
            .json(&json!({
                "room_id": room_id,
                "role": self.config.token_role,
                "user_id": format!("huddle-{}", name),
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(RoomSession {
            room_id,
            room_name: name.to_string(),
            room_code: code["code"].as_str().map(str::to_string),
            auth_token: token["token"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl RoomProvider for HttpRoomProvider {
    async fn create_room(&self, name: &str) -> Option<RoomSession> {
        if !self.config.is_configured() {
            info!("Room provider not configured; continuing without a room");
            return None;
        }

        match self.provision(name).await {
            Ok(session) => {
                info!("Room provisioned: {} ({})", session.room_name, session.room_id);
                Some(session)
            }
            Err(e) => {
                warn!("Room setup failed for {}: {}", name, e);
                None
            }
        }
    }

    async fn end_room(&self, room_id: &str) {
        if !self.config.is_configured() {
            return;
        }

        let result = self
            .client
            .post(format!("{}/active-rooms/{}/end-room", self.config.api_base, room_id))
            .bearer_auth(&self.config.management_token)
            .json(&json!({ "reason": "call ended", "lock": false }))
            .send()
            .await;

        if let Err(e) = result {
            warn!("Failed to end room {}: {}", room_id, e);
        }
    }
}
