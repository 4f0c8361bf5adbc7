use reqwest::Method;

use super::client::{Ack, ApiClient};
use crate::error::{ClientError, Result};
use crate::models::{AuthResponse, LoginRequest, PasswordChange, ProfileUpdate, SignupRequest, User};

impl ApiClient {
    /// Registers an account and stores the returned credentials
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse> {
        let auth: AuthResponse = self
            .send_json(self.public(Method::POST, "/api/auth/signup").json(request))
            .await?;
        self.persist_auth(&auth)?;
        tracing::info!(user_id = %auth.user.id, role = %auth.user.role, "Signed up");
        Ok(auth)
    }

    /// Logs in and stores the returned credentials
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self
            .send_json(self.public(Method::POST, "/api/auth/login").json(&body))
            .await?;
        self.persist_auth(&auth)?;
        tracing::info!(user_id = %auth.user.id, role = %auth.user.role, "Logged in");
        Ok(auth)
    }

    pub async fn me(&self) -> Result<User> {
        let user: User = self.get_json("/api/auth/me").await?;
        self.tokens().set_user(&user)?;
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        if update.is_empty() {
            return Err(ClientError::Api {
                status: reqwest::StatusCode::BAD_REQUEST,
                message: "No data to update".to_string(),
            });
        }
        let user: User = self.put_json("/api/auth/profile", update).await?;
        self.tokens().set_user(&user)?;
        Ok(user)
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        let body = PasswordChange {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        let _: Ack = self.put_json("/api/auth/change-password", &body).await?;
        Ok(())
    }

    /// Drops the stored token and user; there is no server-side logout
    pub fn logout(&self) -> Result<()> {
        self.tokens().clear_credentials()?;
        tracing::info!("Logged out");
        Ok(())
    }

    fn persist_auth(&self, auth: &AuthResponse) -> Result<()> {
        self.tokens().set_access_token(&auth.access_token)?;
        self.tokens().set_user(&auth.user)
    }
}
