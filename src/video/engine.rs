use std::future::Future;

use crate::error::Result;

/// Live-streaming role: hosts publish, the audience only subscribes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    Host,
    Audience,
}

impl ClientRole {
    /// Role code expected by the token endpoint
    pub fn token_role(&self) -> u8 {
        match self {
            ClientRole::Host => 1,
            ClientRole::Audience => 2,
        }
    }
}

/// The hosted real-time video SDK. Media transport, track lifecycle and
/// encoding all live behind this trait.
pub trait RtcEngine: Send + Sync + 'static {
    /// Joins a room and returns the uid the network assigned
    fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        uid: u32,
    ) -> impl Future<Output = Result<u32>> + Send;

    fn leave(&self) -> impl Future<Output = Result<()>> + Send;

    fn set_client_role(&self, role: ClientRole) -> Result<()>;

    fn set_audio_enabled(&self, enabled: bool) -> Result<()>;

    fn set_video_enabled(&self, enabled: bool) -> Result<()>;

    /// Uids of the remote users currently in the room
    fn remote_users(&self) -> Vec<u32>;
}
