use serde::Deserialize;

use super::client::ApiClient;
use crate::error::Result;
use crate::models::StudentStats;

/// One inference result from the emotion detection endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EmotionDetection {
    #[serde(flatten)]
    pub stats: StudentStats,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ApiClient {
    /// Runs one frame (base64-encoded image) through backend inference
    pub async fn detect_emotion(&self, base64_image: &str) -> Result<EmotionDetection> {
        let body = serde_json::json!({ "image": base64_image });
        self.post_json("/api/emotion/detect", &body).await
    }

    pub async fn emotion_service_health(&self) -> Result<serde_json::Value> {
        self.send_json(self.public(reqwest::Method::GET, "/api/emotion/health"))
            .await
    }
}
