use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Idle,
    Connecting,
    Joined { channel: String, uid: u32 },
    Failed(String),
    Left,
}

impl Default for CallState {
    fn default() -> Self {
        Self::Idle
    }
}

impl CallState {
    pub fn is_joined(&self) -> bool {
        matches!(self, CallState::Joined { .. })
    }
}
