use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Session, StudentStats};

/// Inbound events on a session channel, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        #[serde(default)]
        message: String,
        /// Abbreviated session summary, not a full `Session`
        #[serde(default)]
        session: Option<Value>,
    },

    SessionUpdate {
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<String>,
    },

    EmotionResult {
        data: StudentStats,
        #[serde(default)]
        timestamp: Option<String>,
    },

    /// Teacher channel only
    StudentUpdate {
        data: StudentUpdate,
        #[serde(default)]
        timestamp: Option<String>,
    },

    Error {
        #[serde(default)]
        message: String,
    },

    Pong {
        #[serde(default)]
        timestamp: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    SessionUpdate,
    EmotionResult,
    StudentUpdate,
    Error,
    Pong,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connected,
        EventKind::SessionUpdate,
        EventKind::EmotionResult,
        EventKind::StudentUpdate,
        EventKind::Error,
        EventKind::Pong,
    ];
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connected { .. } => EventKind::Connected,
            ServerEvent::SessionUpdate { .. } => EventKind::SessionUpdate,
            ServerEvent::EmotionResult { .. } => EventKind::EmotionResult,
            ServerEvent::StudentUpdate { .. } => EventKind::StudentUpdate,
            ServerEvent::Error { .. } => EventKind::Error,
            ServerEvent::Pong { .. } => EventKind::Pong,
        }
    }

    /// The session carried by a `session_update`, if the payload is a full session
    pub fn session(&self) -> Option<Session> {
        match self {
            ServerEvent::SessionUpdate { data, .. } => serde_json::from_value(data.clone()).ok(),
            _ => None,
        }
    }
}

/// Per-student engagement broadcast to the teacher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentUpdate {
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(flatten)]
    pub stats: StudentStats,
}

/// Outbound messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    EngagementUpdate { data: StudentStats },
    /// Teacher broadcast to every student in the session
    SessionUpdate { data: Value },
    Ping,
}

/// Which side of the session a channel is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Student,
    Teacher,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Student => "student",
            ChannelRole::Teacher => "teacher",
        }
    }
}

pub fn channel_url(ws_base_url: &str, session_id: &str, role: ChannelRole, user_id: &str) -> String {
    format!(
        "{}/ws/session/{}/{}/{}",
        ws_base_url.trim_end_matches('/'),
        urlencoding::encode(session_id),
        role.as_str(),
        urlencoding::encode(user_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Engagement;

    #[test]
    fn test_parse_connected() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"connected","message":"Connected to session as student","session":{"id":"s","code":"AB12CD"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::Connected);
    }

    #[test]
    fn test_parse_emotion_result() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"emotion_result","data":{"emotion":"bored","engagement":"distracted","focus_level":12,"face_detected":true}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::EmotionResult { data, .. } => {
                assert_eq!(data.engagement, Some(Engagement::Distracted));
                assert_eq!(data.focus_level, Some(12));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_student_update() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"student_update","data":{"student_id":"s1","student_name":"Ana","emotion":"happy","engagement":"active","focus_level":88},"timestamp":"2024-05-02T10:00:00"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::StudentUpdate { data, .. } => {
                assert_eq!(data.student_name, "Ana");
                assert_eq!(data.stats.focus_level, Some(88));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"teleport"}"#).is_err());
        assert!(serde_json::from_str::<ServerEvent>(r#"{"message":"no tag"}"#).is_err());
    }

    #[test]
    fn test_pong_without_timestamp() {
        let event: ServerEvent = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(event, ServerEvent::Pong { timestamp: None });
    }

    #[test]
    fn test_session_update_non_session_payload() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"session_update","data":{"announcement":"quiz"}}"#).unwrap();
        assert_eq!(event.kind(), EventKind::SessionUpdate);
        assert!(event.session().is_none());
    }

    #[test]
    fn test_client_message_wire_format() {
        let ping = serde_json::to_value(ClientMessage::Ping).unwrap();
        assert_eq!(ping, serde_json::json!({ "type": "ping" }));

        let update = ClientMessage::EngagementUpdate {
            data: StudentStats {
                engagement: Some(Engagement::Passive),
                focus_level: Some(50),
                ..Default::default()
            },
        };
        assert_eq!(
            serde_json::to_value(update).unwrap(),
            serde_json::json!({
                "type": "engagement_update",
                "data": { "engagement": "passive", "focus_level": 50 }
            })
        );
    }

    #[test]
    fn test_channel_url() {
        assert_eq!(
            channel_url("ws://localhost:8000/", "665f1c", ChannelRole::Student, "s 1"),
            "ws://localhost:8000/ws/session/665f1c/student/s%201"
        );
    }
}
