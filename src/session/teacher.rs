use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};

use super::state::ClassroomState;
use crate::api::ApiClient;
use crate::config::RealtimeConfig;
use crate::error::{ClientError, Result};
use crate::models::Session;
use crate::ws::{ChannelRole, ClientMessage, EventKind, ServerEvent, SessionConnection};

/// Teacher-side counterpart of `StudentSession`: runs one live session and
/// collects the per-student updates the backend relays.
pub struct TeacherSession {
    api: ApiClient,
    realtime: RealtimeConfig,
    teacher_id: String,
    state: Arc<watch::Sender<ClassroomState>>,
    connection: Mutex<Option<SessionConnection>>,
}

impl TeacherSession {
    pub fn new(api: ApiClient, realtime: RealtimeConfig, teacher_id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ClassroomState::default());
        Self {
            api,
            realtime,
            teacher_id: teacher_id.into(),
            state: Arc::new(state),
            connection: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ClassroomState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ClassroomState {
        self.state.borrow().clone()
    }

    pub async fn create(&self, subject: &str, max_students: u32) -> Result<Session> {
        let session = self.rest(self.api.create_session(subject, max_students)).await?;
        self.state.send_modify(|s| s.session = Some(session.clone()));
        Ok(session)
    }

    /// Starts the session and opens the teacher channel
    pub async fn start(&self, session_id: &str) -> Result<Session> {
        let session = self.rest(self.api.start_session(session_id)).await?;
        self.attach(session.clone()).await?;
        Ok(session)
    }

    /// Watches a session that is already running
    pub async fn attach(&self, session: Session) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if let Some(previous) = slot.take() {
            previous.disconnect().await;
        }

        let session_id = session.id.clone();
        self.state.send_modify(|s| {
            s.session = Some(session);
            s.students.clear();
        });

        let conn = SessionConnection::for_session(
            self.realtime.clone(),
            &session_id,
            ChannelRole::Teacher,
            &self.teacher_id,
        );
        self.wire(&conn);
        if let Err(e) = conn.connect().await {
            tracing::warn!(session_id = %session_id, error = %e, "Teacher channel unavailable");
            self.state.send_modify(|s| s.error = Some(e.user_message()));
            return Err(e);
        }
        *slot = Some(conn);

        tracing::info!(session_id = %session_id, teacher_id = %self.teacher_id, "Monitoring session");
        Ok(())
    }

    pub async fn end(&self) -> Result<Session> {
        let session_id = self
            .state
            .borrow()
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(ClientError::NoCurrentSession)?;

        let session = self.rest(self.api.end_session(&session_id)).await?;
        self.close().await;
        self.state.send_modify(|s| s.session = Some(session.clone()));
        Ok(session)
    }

    /// Relays arbitrary data to every student in the session
    pub async fn broadcast(&self, data: Value) -> Result<()> {
        let slot = self.connection.lock().await;
        let conn = slot.as_ref().ok_or(ClientError::NotConnected)?;
        conn.send(&ClientMessage::SessionUpdate { data })
    }

    pub async fn close(&self) {
        if let Some(conn) = self.connection.lock().await.take() {
            conn.disconnect().await;
        }
    }

    fn wire(&self, conn: &SessionConnection) {
        let state = self.state.clone();
        conn.on(EventKind::StudentUpdate, move |event| {
            if let ServerEvent::StudentUpdate { data, .. } = event {
                tracing::debug!(
                    student_id = %data.student_id,
                    engagement = ?data.stats.engagement,
                    focus = ?data.stats.focus_level,
                    "Student update"
                );
                state.send_modify(|s| {
                    s.students.insert(data.student_id.clone(), data.clone());
                });
            }
        });

        let state = self.state.clone();
        conn.on(EventKind::Error, move |event| {
            if let ServerEvent::Error { message } = event {
                state.send_modify(|s| s.error = Some(message.clone()));
            }
        });

        let state = self.state.clone();
        conn.on(EventKind::Connected, move |_| {
            state.send_modify(|s| s.error = None);
        });
    }

    async fn rest<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        let result = call.await;
        self.state.send_modify(|s| {
            s.loading = false;
            if let Err(e) = &result {
                s.error = Some(e.user_message());
            }
        });
        result
    }
}
