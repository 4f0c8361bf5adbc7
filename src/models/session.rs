use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stats::StudentStats;
use super::timestamp;

/// A teacher-owned live class; the client only ever holds a cached copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(alias = "_id")]
    pub id: String,
    pub session_code: String,
    pub teacher_id: String,
    #[serde(default)]
    pub teacher_name: String,
    pub subject: String,
    pub max_students: u32,
    pub is_active: bool,
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn student(&self, student_id: &str) -> Option<&StudentEntry> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn is_full(&self) -> bool {
        self.students.len() >= self.max_students as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(with = "timestamp")]
    pub joined_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: StudentStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub subject: String,
    pub max_students: u32,
}

/// Body of the REST engagement fallback
#[derive(Debug, Clone, Serialize)]
pub struct EngagementRecord {
    pub student_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub stats: StudentStats,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}
