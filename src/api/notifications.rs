use reqwest::Method;

use super::client::{segment, Ack, ApiClient};
use crate::error::Result;
use crate::models::{NewNotification, Notification, NotificationQuery, UnreadCount};

impl ApiClient {
    pub async fn notifications(&self, query: NotificationQuery) -> Result<Vec<Notification>> {
        let request = self.authorized(Method::GET, "/api/notifications/")?.query(&query);
        self.send_json(request).await
    }

    pub async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.post_json("/api/notifications/", notification).await
    }

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let path = format!("/api/notifications/{}/read", segment(notification_id));
        let _: Ack = self.put_json(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    /// Returns the server's confirmation message
    pub async fn mark_all_notifications_read(&self) -> Result<String> {
        let ack: Ack = self
            .put_json("/api/notifications/read-all", &serde_json::json!({}))
            .await?;
        Ok(ack.message)
    }

    pub async fn delete_notification(&self, notification_id: &str) -> Result<()> {
        let path = format!("/api/notifications/{}", segment(notification_id));
        let _: Ack = self.send_json(self.authorized(Method::DELETE, &path)?).await?;
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<u64> {
        let count: UnreadCount = self.get_json("/api/notifications/unread-count").await?;
        Ok(count.unread_count)
    }
}
