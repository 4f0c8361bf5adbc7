use serde::{Deserialize, Serialize};

use super::client::ApiClient;
use crate::error::Result;

/// Credentials for joining a room on the hosted video network
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VideoToken {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: u32,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoServiceConfig {
    pub available: bool,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    channel_name: &'a str,
    uid: u32,
    role: u8,
}

impl ApiClient {
    /// `token_role` is 1 for publisher, 2 for subscriber
    pub async fn video_token(&self, channel_name: &str, uid: u32, token_role: u8) -> Result<VideoToken> {
        let body = TokenRequest {
            channel_name,
            uid,
            role: token_role,
        };
        self.post_json("/api/agora/token", &body).await
    }

    pub async fn video_config(&self) -> Result<VideoServiceConfig> {
        self.get_json("/api/agora/config").await
    }
}
