use reqwest::Method;
use serde_json::Value;

use super::client::{segment, ApiClient};
use crate::error::Result;
use crate::models::{ExportFormat, ExportedFile};

impl ApiClient {
    /// Aggregated report for one session, as computed by the backend
    pub async fn session_report(&self, session_id: &str) -> Result<Value> {
        self.get_json(&format!("/api/reports/session/{}", segment(session_id)))
            .await
    }

    pub async fn teacher_summary(&self, days: u32) -> Result<Value> {
        let request = self
            .authorized(Method::GET, "/api/reports/teacher/summary")?
            .query(&[("days", days)]);
        self.send_json(request).await
    }

    pub async fn student_summary(&self, days: u32) -> Result<Value> {
        let request = self
            .authorized(Method::GET, "/api/reports/student/summary")?
            .query(&[("days", days)]);
        self.send_json(request).await
    }

    pub async fn admin_overview(&self, days: u32) -> Result<Value> {
        let request = self
            .authorized(Method::GET, "/api/reports/admin/overview")?
            .query(&[("days", days)]);
        self.send_json(request).await
    }

    pub async fn export_session_report(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> Result<ExportedFile> {
        let path = format!("/api/reports/session/{}/export", segment(session_id));
        let request = self
            .authorized(Method::GET, &path)?
            .query(&[("format", format.as_str())]);
        let fallback = format!("session_{}_report.{}", session_id, format.as_str());
        self.send_bytes(request, &fallback).await
    }

    pub async fn export_teacher_summary(&self, days: u32, format: ExportFormat) -> Result<ExportedFile> {
        self.export_summary("/api/reports/teacher/summary/export", "teacher", days, format)
            .await
    }

    pub async fn export_student_summary(&self, days: u32, format: ExportFormat) -> Result<ExportedFile> {
        self.export_summary("/api/reports/student/summary/export", "student", days, format)
            .await
    }

    async fn export_summary(
        &self,
        path: &str,
        who: &str,
        days: u32,
        format: ExportFormat,
    ) -> Result<ExportedFile> {
        let request = self
            .authorized(Method::GET, path)?
            .query(&[("days", days.to_string()), ("format", format.as_str().to_string())]);
        let fallback = format!("{}_summary_{}days.{}", who, days, format.as_str());
        self.send_bytes(request, &fallback).await
    }
}
