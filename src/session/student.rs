use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use super::state::SessionState;
use crate::api::ApiClient;
use crate::config::RealtimeConfig;
use crate::error::{ClientError, Result};
use crate::models::{Session, StatsUpdate, StudentStats};
use crate::ws::{ChannelRole, ClientMessage, EventKind, ServerEvent, SessionConnection};

/// How an engagement update left the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Realtime,
    Rest,
    /// No session to report to; only local stats changed
    LocalOnly,
}

/// Bridges REST and the realtime channel into one watched `SessionState`
/// for a single student. At most one connection is open at a time.
pub struct StudentSession {
    api: ApiClient,
    realtime: RealtimeConfig,
    student_id: String,
    state: Arc<watch::Sender<SessionState>>,
    connection: Mutex<Option<SessionConnection>>,
}

impl StudentSession {
    pub fn new(api: ApiClient, realtime: RealtimeConfig, student_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            api,
            realtime,
            student_id: student_id.into(),
            state: Arc::new(state),
            connection: Mutex::new(None),
        }
    }

    /// Uses the stored user, asking the backend when nothing is cached
    pub async fn for_signed_in_user(api: ApiClient, realtime: RealtimeConfig) -> Result<Self> {
        let user = match api.tokens().user()? {
            Some(user) => user,
            None => api.me().await?,
        };
        Ok(Self::new(api, realtime, user.id))
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .map_or(false, SessionConnection::is_connected)
    }

    pub async fn load_past_sessions(&self) -> Result<Vec<Session>> {
        let sessions = self.track(self.api.student_sessions()).await?;
        let past: Vec<Session> = sessions.into_iter().filter(|s| !s.is_active).collect();
        self.state.send_modify(|s| s.past_sessions = past.clone());
        Ok(past)
    }

    /// A 404 means "no active session" and leaves the error field empty
    pub async fn load_active_session(&self) -> Result<Option<Session>> {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.api.active_student_session().await {
            Ok(session) => {
                self.state.send_modify(|s| s.loading = false);
                self.enter_session(session.clone()).await;
                Ok(Some(session))
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(student_id = %self.student_id, "No active session");
                self.close_connection().await;
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.current_session = None;
                });
                Ok(None)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    pub async fn join_session(&self, code: &str) -> Result<Session> {
        let session = self.track(self.api.join_session(code)).await?;
        tracing::info!(
            session_id = %session.id,
            code = %session.session_code,
            student_id = %self.student_id,
            "Joined session"
        );
        self.enter_session(session.clone()).await;
        Ok(session)
    }

    pub async fn leave_session(&self, session_id: &str) -> Result<()> {
        self.track(self.api.leave_session(session_id)).await?;

        let is_current = self.snapshot().current_session_id() == Some(session_id);
        if is_current {
            self.close_connection().await;
        }
        self.state.send_modify(|s| {
            s.retire_current(session_id);
        });

        tracing::info!(session_id = %session_id, student_id = %self.student_id, "Left session");
        Ok(())
    }

    /// Merges into local stats, then delivers over the socket or, failing that, REST
    pub async fn update_engagement(&self, update: StatsUpdate) -> Result<Delivery> {
        let mut merged = StudentStats::default();
        self.state.send_modify(|s| {
            s.stats.merge(&update);
            merged = s.stats.clone();
        });

        {
            let slot = self.connection.lock().await;
            if let Some(conn) = slot.as_ref().filter(|c| c.is_connected()) {
                match conn.send(&ClientMessage::EngagementUpdate {
                    data: merged.clone(),
                }) {
                    Ok(()) => return Ok(Delivery::Realtime),
                    Err(e) => {
                        tracing::warn!(error = %e, "Realtime engagement update failed, using REST");
                    }
                }
            }
        }

        let session_id = match self.snapshot().current_session_id() {
            Some(id) => id.to_string(),
            None => return Ok(Delivery::LocalOnly),
        };

        self.api
            .post_engagement(&session_id, &self.student_id, &merged)
            .await
            .map_err(|e| {
                self.fail(&e);
                e
            })?;
        Ok(Delivery::Rest)
    }

    /// Re-fetches the current session; an ended session moves to the past list
    pub async fn refresh_session(&self) -> Result<Session> {
        let session_id = self
            .snapshot()
            .current_session_id()
            .map(str::to_string)
            .ok_or(ClientError::NoCurrentSession)?;

        let session = self.track(self.api.get_session(&session_id)).await?;

        if session.is_active {
            self.state
                .send_modify(|s| s.current_session = Some(session.clone()));
        } else {
            tracing::info!(session_id = %session_id, "Session has ended");
            self.close_connection().await;
            self.state.send_modify(|s| {
                s.current_session = Some(session.clone());
                s.retire_current(&session_id);
            });
        }
        Ok(session)
    }

    /// Tears down the realtime channel
    pub async fn close(&self) {
        self.close_connection().await;
    }

    async fn enter_session(&self, session: Session) {
        let session_id = session.id.clone();
        self.state.send_modify(|s| s.current_session = Some(session));
        self.open_connection(&session_id).await;
    }

    async fn open_connection(&self, session_id: &str) {
        let mut slot = self.connection.lock().await;
        if let Some(previous) = slot.take() {
            previous.disconnect().await;
        }

        let conn = SessionConnection::for_session(
            self.realtime.clone(),
            session_id,
            ChannelRole::Student,
            &self.student_id,
        );
        self.wire(&conn, session_id);

        match conn.connect().await {
            Ok(()) => *slot = Some(conn),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Realtime channel unavailable, engagement updates will use REST"
                );
            }
        }
    }

    async fn close_connection(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.disconnect().await;
        }
    }

    fn wire(&self, conn: &SessionConnection, session_id: &str) {
        let state = self.state.clone();
        conn.on(EventKind::Connected, move |event| {
            if let ServerEvent::Connected { message, .. } = event {
                tracing::info!(message = %message, "Session channel ready");
            }
            state.send_modify(|s| s.error = None);
        });

        let state = self.state.clone();
        let expected_id = session_id.to_string();
        conn.on(EventKind::SessionUpdate, move |event| match event.session() {
            Some(session) if session.id == expected_id => {
                state.send_modify(|s| {
                    if s.current_session_id() == Some(expected_id.as_str()) {
                        s.current_session = Some(session);
                    }
                });
            }
            Some(session) => {
                tracing::debug!(session_id = %session.id, "Ignoring update for another session");
            }
            None => tracing::debug!("Session update without a session payload"),
        });

        let state = self.state.clone();
        conn.on(EventKind::EmotionResult, move |event| {
            if let ServerEvent::EmotionResult { data, .. } = event {
                state.send_modify(|s| s.stats = data.clone());
            }
        });

        let state = self.state.clone();
        conn.on(EventKind::Error, move |event| {
            if let ServerEvent::Error { message } = event {
                tracing::warn!(message = %message, "Session channel error");
                state.send_modify(|s| s.error = Some(message.clone()));
            }
        });

        conn.on(EventKind::Pong, |_| tracing::trace!("pong"));
    }

    /// Runs a REST call with the loading flag set; failures land in `error`
    async fn track<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match call.await {
            Ok(value) => {
                self.state.send_modify(|s| s.loading = false);
                Ok(value)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn fail(&self, error: &ClientError) {
        let message = error.user_message();
        tracing::warn!(student_id = %self.student_id, error = %message, "Session request failed");
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }
}
