use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::{ClientRole, RtcEngine};
use super::state::CallState;
use crate::api::ApiClient;
use crate::error::{ClientError, Result};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct JoinRequest {
    channel: String,
    role: ClientRole,
}

/// One user's membership in a video room. Owns the engine handle and the
/// remote-user poller; dropping the call stops polling.
pub struct VideoCall<E: RtcEngine> {
    api: ApiClient,
    engine: Arc<E>,
    uid: u32,
    poll_interval: Duration,
    state: watch::Sender<CallState>,
    remote_users: Arc<watch::Sender<Vec<u32>>>,
    audio_enabled: bool,
    video_enabled: bool,
    last_request: Option<JoinRequest>,
    poller: Option<JoinHandle<()>>,
}

impl<E: RtcEngine> VideoCall<E> {
    pub fn new(api: ApiClient, engine: E, poll_interval: Duration) -> Self {
        let (state, _) = watch::channel(CallState::Idle);
        let (remote_users, _) = watch::channel(Vec::new());
        Self {
            api,
            engine: Arc::new(engine),
            uid: 0,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            state,
            remote_users: Arc::new(remote_users),
            audio_enabled: true,
            video_enabled: true,
            last_request: None,
            poller: None,
        }
    }

    /// Requests a fixed uid instead of letting the network assign one
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> CallState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    pub fn remote_users(&self) -> watch::Receiver<Vec<u32>> {
        self.remote_users.subscribe()
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub async fn join(&mut self, channel: &str, role: ClientRole) -> Result<()> {
        if let CallState::Joined { channel: current, .. } = self.state() {
            if current == channel {
                return Ok(());
            }
            self.leave().await?;
        }

        let request = JoinRequest {
            channel: channel.to_string(),
            role,
        };
        self.last_request = Some(request.clone());
        self.connect(request).await
    }

    /// Re-runs the last join after a failure
    pub async fn retry(&mut self) -> Result<()> {
        if self.state().is_joined() {
            return Ok(());
        }
        let request = self
            .last_request
            .clone()
            .ok_or_else(|| ClientError::video("No previous join to retry"))?;

        tracing::info!(channel = %request.channel, "Retrying video join");
        self.connect(request).await
    }

    pub fn toggle_audio(&mut self) -> Result<bool> {
        let enabled = !self.audio_enabled;
        if self.state().is_joined() {
            self.engine.set_audio_enabled(enabled)?;
        }
        self.audio_enabled = enabled;
        tracing::debug!(enabled, "Microphone toggled");
        Ok(enabled)
    }

    pub fn toggle_video(&mut self) -> Result<bool> {
        let enabled = !self.video_enabled;
        if self.state().is_joined() {
            self.engine.set_video_enabled(enabled)?;
        }
        self.video_enabled = enabled;
        tracing::debug!(enabled, "Camera toggled");
        Ok(enabled)
    }

    /// Leaves the room; a no-op unless joined or joining
    pub async fn leave(&mut self) -> Result<()> {
        self.stop_polling();

        let in_room = matches!(
            self.state(),
            CallState::Joined { .. } | CallState::Connecting
        );
        if !in_room {
            return Ok(());
        }

        let result = self.engine.leave().await;
        self.state.send_replace(CallState::Left);
        self.remote_users.send_replace(Vec::new());

        match &result {
            Ok(()) => tracing::info!("Left video room"),
            Err(e) => tracing::warn!(error = %e, "Engine reported an error while leaving"),
        }
        result
    }

    async fn connect(&mut self, request: JoinRequest) -> Result<()> {
        self.state.send_replace(CallState::Connecting);

        match self.try_join(&request).await {
            Ok(uid) => {
                tracing::info!(channel = %request.channel, uid, role = ?request.role, "Joined video room");
                self.state.send_replace(CallState::Joined {
                    channel: request.channel,
                    uid,
                });
                self.start_polling();
                Ok(())
            }
            Err(e) => {
                tracing::error!(channel = %request.channel, error = %e, "Failed to join video room");
                self.state.send_replace(CallState::Failed(e.user_message()));
                Err(e)
            }
        }
    }

    async fn try_join(&self, request: &JoinRequest) -> Result<u32> {
        let token = self
            .api
            .video_token(&request.channel, self.uid, request.role.token_role())
            .await?;

        self.engine.set_client_role(request.role)?;
        let uid = self
            .engine
            .join(&token.app_id, &token.channel_name, &token.token, token.uid)
            .await?;

        self.engine.set_audio_enabled(self.audio_enabled)?;
        self.engine.set_video_enabled(self.video_enabled)?;
        Ok(uid)
    }

    fn start_polling(&mut self) {
        self.stop_polling();

        let engine = self.engine.clone();
        let users = self.remote_users.clone();
        let period = self.poll_interval;

        self.poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let current = engine.remote_users();
                users.send_if_modified(|list| {
                    if *list == current {
                        false
                    } else {
                        *list = current;
                        true
                    }
                });
            }
        }));
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

impl<E: RtcEngine> Drop for VideoCall<E> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
