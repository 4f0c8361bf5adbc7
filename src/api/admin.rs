use reqwest::Method;
use serde_json::Value;

use super::client::{segment, Ack, ApiClient};
use crate::error::Result;
use crate::models::{Session, SystemStats, User, UserRole};

impl ApiClient {
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.get_json("/api/admin/users").await
    }

    pub async fn users_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        self.get_json(&format!("/api/admin/users/role/{}", role.as_str()))
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        self.get_json(&format!("/api/admin/users/{}", segment(user_id)))
            .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let path = format!("/api/admin/users/{}", segment(user_id));
        let _: Ack = self.send_json(self.authorized(Method::DELETE, &path)?).await?;
        Ok(())
    }

    pub async fn update_user_role(&self, user_id: &str, role: UserRole) -> Result<()> {
        let path = format!("/api/admin/users/{}/role", segment(user_id));
        let request = self
            .authorized(Method::PUT, &path)?
            .query(&[("new_role", role.as_str())]);
        let _: Ack = self.send_json(request).await?;
        Ok(())
    }

    pub async fn all_sessions(&self) -> Result<Vec<Session>> {
        self.get_json("/api/admin/sessions").await
    }

    pub async fn active_sessions(&self) -> Result<Vec<Session>> {
        self.get_json("/api/admin/sessions/active").await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let path = format!("/api/admin/sessions/{}", segment(session_id));
        let _: Ack = self.send_json(self.authorized(Method::DELETE, &path)?).await?;
        Ok(())
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        self.get_json("/api/admin/stats").await
    }

    /// Raw engagement history for a session
    pub async fn session_engagement(&self, session_id: &str) -> Result<Value> {
        self.get_json(&format!("/api/admin/engagement/{}", segment(session_id)))
            .await
    }
}
