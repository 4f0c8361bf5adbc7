use std::collections::BTreeMap;

use crate::models::{Session, StudentStats};
use crate::ws::StudentUpdate;

/// Everything a student view renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub current_session: Option<Session>,
    pub past_sessions: Vec<Session>,
    pub stats: StudentStats,
    pub error: Option<String>,
    pub loading: bool,
}

impl SessionState {
    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session.as_ref().map(|s| s.id.as_str())
    }

    /// Moves the current session to the front of the past list if its id matches
    pub(crate) fn retire_current(&mut self, session_id: &str) -> bool {
        let matches = self
            .current_session
            .as_ref()
            .map_or(false, |s| s.id == session_id);
        if !matches {
            return false;
        }

        if let Some(session) = self.current_session.take() {
            self.past_sessions.retain(|p| p.id != session.id);
            self.past_sessions.insert(0, session);
        }
        true
    }
}

/// Everything a teacher dashboard renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassroomState {
    pub session: Option<Session>,
    /// Latest update per student id
    pub students: BTreeMap<String, StudentUpdate>,
    pub error: Option<String>,
    pub loading: bool,
}

impl ClassroomState {
    pub fn average_focus(&self) -> Option<f32> {
        let levels: Vec<f32> = self
            .students
            .values()
            .filter_map(|u| u.stats.focus_level)
            .map(f32::from)
            .collect();
        if levels.is_empty() {
            None
        } else {
            Some(levels.iter().sum::<f32>() / levels.len() as f32)
        }
    }
}
