use chrono::Utc;

use super::client::{segment, Ack, ApiClient};
use crate::error::Result;
use crate::models::{CreateSessionRequest, EngagementRecord, Session, StudentStats};

impl ApiClient {
    // Teacher side

    pub async fn create_session(&self, subject: &str, max_students: u32) -> Result<Session> {
        let body = CreateSessionRequest {
            subject: subject.to_string(),
            max_students,
        };
        let session: Session = self.post_json("/api/sessions/create", &body).await?;
        tracing::info!(session_id = %session.id, code = %session.session_code, "Session created");
        Ok(session)
    }

    pub async fn start_session(&self, session_id: &str) -> Result<Session> {
        let path = format!("/api/sessions/{}/start", segment(session_id));
        self.post_json(&path, &serde_json::json!({})).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<Session> {
        let path = format!("/api/sessions/{}/end", segment(session_id));
        self.post_json(&path, &serde_json::json!({})).await
    }

    pub async fn teacher_sessions(&self) -> Result<Vec<Session>> {
        self.get_json("/api/sessions/teacher").await
    }

    pub async fn active_teacher_session(&self) -> Result<Session> {
        self.get_json("/api/sessions/teacher/active").await
    }

    // Student side

    pub async fn join_session(&self, session_code: &str) -> Result<Session> {
        let body = serde_json::json!({ "session_code": session_code.trim().to_uppercase() });
        self.post_json("/api/sessions/join", &body).await
    }

    pub async fn leave_session(&self, session_id: &str) -> Result<()> {
        let path = format!("/api/sessions/{}/leave", segment(session_id));
        let _: Ack = self.post_json(&path, &serde_json::json!({})).await?;
        Ok(())
    }

    pub async fn student_sessions(&self) -> Result<Vec<Session>> {
        self.get_json("/api/sessions/student").await
    }

    /// Returns `ClientError::Api` with 404 when the student has no active session
    pub async fn active_student_session(&self) -> Result<Session> {
        self.get_json("/api/sessions/student/active").await
    }

    /// REST path for engagement updates when the realtime channel is down
    pub async fn post_engagement(
        &self,
        session_id: &str,
        student_id: &str,
        stats: &StudentStats,
    ) -> Result<()> {
        let body = EngagementRecord {
            student_id: student_id.to_string(),
            session_id: session_id.to_string(),
            stats: stats.clone(),
            timestamp: Utc::now(),
        };
        let path = format!("/api/sessions/{}/engagement", segment(session_id));
        let _: Ack = self.post_json(&path, &body).await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.get_json(&format!("/api/sessions/{}", segment(session_id))).await
    }
}
