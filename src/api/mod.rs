mod admin;
mod auth;
mod client;
mod emotion;
mod notifications;
mod reports;
mod sessions;
mod video;

pub use client::{Ack, ApiClient};
pub use emotion::EmotionDetection;
pub use video::{VideoServiceConfig, VideoToken};

use crate::error::Result;

impl ApiClient {
    /// Backend liveness check; needs no token
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.send_json(self.public(reqwest::Method::GET, "/health")).await
    }
}
