// Integration tests for the engagement client
// REST calls run against a wiremock backend; the session channel runs against
// a warp WebSocket route bound to an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use warp::ws::{Message, WebSocket};
use warp::Filter;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use engagement_client::config::{ApiConfig, RealtimeConfig};
use engagement_client::error::ClientError;
use engagement_client::models::{Engagement, ExportFormat, HeadPose, StatsUpdate, StudentStats, UserRole};
use engagement_client::session::{Delivery, StudentSession, TeacherSession};
use engagement_client::ws::{ChannelRole, ClientMessage, EventKind, ServerEvent, SessionConnection};
use engagement_client::{ApiClient, TokenStore};

const WAIT: Duration = Duration::from_secs(5);

fn session_json(id: &str, active: bool) -> Value {
    json!({
        "_id": id,
        "session_code": "AB12CD",
        "teacher_id": "teacher-1",
        "teacher_name": "Ms. Rivera",
        "subject": "Chemistry",
        "max_students": 30,
        "is_active": active,
        "students": [],
        "created_at": "2024-05-02T09:00:00",
        "started_at": "2024-05-02T09:05:00"
    })
}

fn api_client(server: &MockServer) -> ApiClient {
    let tokens = TokenStore::in_memory();
    tokens.set_access_token("test-token").unwrap();
    api_client_with(server, tokens)
}

fn api_client_with(server: &MockServer, tokens: TokenStore) -> ApiClient {
    let config = ApiConfig {
        base_url: server.uri(),
        request_timeout: Duration::from_secs(5),
    };
    ApiClient::new(&config, tokens).unwrap()
}

fn realtime(ws_base_url: String) -> RealtimeConfig {
    RealtimeConfig {
        ws_base_url,
        ..Default::default()
    }
}

/// Nothing listens on the discard port, so connecting fails immediately
fn unreachable_realtime() -> RealtimeConfig {
    realtime("ws://127.0.0.1:9".to_string())
}

async fn mount_join(server: &MockServer, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/sessions/join"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({ "session_code": "AB12CD" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(session_id, true)))
        .mount(server)
        .await;
}

async fn mount_join_code(server: &MockServer, code: &str, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/sessions/join"))
        .and(body_partial_json(json!({ "session_code": code })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json(session_id, true)))
        .mount(server)
        .await;
}

/// What the realtime backend observed, in order
#[derive(Debug, Clone, PartialEq)]
enum BackendEvent {
    Opened { session_id: String, role: String },
    Received { role: String, value: Value },
    Closed { session_id: String },
}

type SocketRegistry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>>;

/// Scripted stand-in for the realtime backend
struct WsBackend {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    sockets: SocketRegistry,
}

impl WsBackend {
    /// Each accepted socket gets a `connected` frame, then `script`
    async fn start(script: Vec<Value>) -> Self {
        Self::closing(script, 0).await
    }

    /// Like `start`, but the first `close_first` sockets are hung up on once
    /// the script is sent
    async fn closing(script: Vec<Value>, close_first: usize) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let sockets: SocketRegistry = Arc::new(Mutex::new(HashMap::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(script);

        let registry = sockets.clone();
        let route = warp::path!("ws" / "session" / String / String / String)
            .and(warp::ws())
            .map(move |session_id: String, role: String, _user_id: String, ws: warp::ws::Ws| {
                let socket = BackendSocket {
                    session_id,
                    role,
                    script: script.clone(),
                    hang_up: accepted.fetch_add(1, Ordering::SeqCst) < close_first,
                    events: events_tx.clone(),
                    sockets: registry.clone(),
                };
                ws.on_upgrade(move |ws| socket.serve(ws))
            });

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, events, sockets }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn next_event(&mut self) -> BackendEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("backend saw nothing")
            .expect("backend channel closed")
    }

    /// Next message a client sent, with the role it connected as
    async fn next_message(&mut self) -> (String, Value) {
        loop {
            if let BackendEvent::Received { role, value } = self.next_event().await {
                return (role, value);
            }
        }
    }

    /// Next socket open or close, skipping client messages
    async fn next_lifecycle(&mut self) -> BackendEvent {
        loop {
            match self.next_event().await {
                BackendEvent::Received { .. } => continue,
                event => return event,
            }
        }
    }

    /// Writes a frame to the socket serving `session_id`, once it is accepted
    async fn push(&self, session_id: &str, frame: Value) {
        let sender = timeout(WAIT, async {
            loop {
                if let Some(tx) = self.sockets.lock().unwrap().get(session_id).cloned() {
                    return tx;
                }
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("no socket for session");
        // A socket that already went away simply drops the frame
        let _ = sender.send(frame);
    }
}

struct BackendSocket {
    session_id: String,
    role: String,
    script: Arc<Vec<Value>>,
    hang_up: bool,
    events: mpsc::UnboundedSender<BackendEvent>,
    sockets: SocketRegistry,
}

impl BackendSocket {
    async fn serve(self, socket: WebSocket) {
        let (mut tx, mut rx) = socket.split();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Value>();
        self.sockets
            .lock()
            .unwrap()
            .insert(self.session_id.clone(), push_tx);
        let _ = self.events.send(BackendEvent::Opened {
            session_id: self.session_id.clone(),
            role: self.role.clone(),
        });

        let connected = json!({
            "type": "connected",
            "message": format!("Connected to session as {}", self.role),
            "session": { "id": self.session_id, "code": "AB12CD" }
        });
        let mut frames = vec![connected];
        frames.extend(self.script.iter().cloned());
        for frame in frames {
            if tx.send(Message::text(frame.to_string())).await.is_err() {
                self.closed();
                return;
            }
        }
        if self.hang_up {
            let _ = tx.send(Message::close_with(1008u16, "Session not active")).await;
            self.closed();
            return;
        }

        let mut reported_close = false;
        loop {
            tokio::select! {
                frame = rx.next() => match frame {
                    Some(Ok(msg)) if msg.is_close() => {
                        // Reported before tungstenite flushes the close reply
                        self.closed();
                        reported_close = true;
                    }
                    Some(Ok(msg)) => {
                        let Ok(text) = msg.to_str() else { continue };
                        let Ok(value) = serde_json::from_str::<Value>(text) else { continue };
                        if value["type"] == "ping" {
                            let pong = json!({ "type": "pong", "timestamp": "2024-05-02T10:00:00" });
                            let _ = tx.send(Message::text(pong.to_string())).await;
                        }
                        let _ = self.events.send(BackendEvent::Received {
                            role: self.role.clone(),
                            value,
                        });
                    }
                    _ => break,
                },
                pushed = push_rx.recv() => match pushed {
                    Some(frame) => {
                        if tx.send(Message::text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        if !reported_close {
            self.closed();
        }
    }

    fn closed(&self) {
        let _ = self.events.send(BackendEvent::Closed {
            session_id: self.session_id.clone(),
        });
    }
}

/// Polls `condition` until it holds or the test times out
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let polled = timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {}", what);
}

#[tokio::test]
async fn test_join_sets_current_session() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    let session = student.join_session(" ab12cd ").await.unwrap();

    let state = student.snapshot();
    assert_eq!(session.id, "sess-1");
    assert_eq!(state.current_session, Some(session));
    assert!(state.error.is_none());
    assert!(!state.loading);
    // Channel failure is logged only
    assert!(!student.is_connected().await);
}

#[tokio::test]
async fn test_join_error_carries_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/join"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "detail": "Session is full" })))
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    let err = student.join_session("AB12CD").await.unwrap_err();

    assert!(matches!(err, ClientError::Api { .. }));
    assert_eq!(err.user_message(), "Session is full");
    let state = student.snapshot();
    assert_eq!(state.error.as_deref(), Some("Session is full"));
    assert!(state.current_session.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn test_leave_moves_session_to_past() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/leave"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Left session successfully" })))
        .expect(1)
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    student.join_session("AB12CD").await.unwrap();
    student.leave_session("sess-1").await.unwrap();

    let state = student.snapshot();
    assert!(state.current_session.is_none());
    assert_eq!(state.past_sessions.len(), 1);
    assert_eq!(state.past_sessions[0].id, "sess-1");
}

#[tokio::test]
async fn test_no_active_session_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/student/active"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "No active session found" })))
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    let active = student.load_active_session().await.unwrap();

    assert!(active.is_none());
    let state = student.snapshot();
    assert!(state.error.is_none());
    assert!(state.current_session.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn test_load_past_sessions_keeps_inactive_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/student"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            session_json("live", true),
            session_json("old-1", false),
            session_json("old-2", false)
        ])))
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    let past = student.load_past_sessions().await.unwrap();

    let ids: Vec<&str> = past.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["old-1", "old-2"]);
    assert_eq!(student.snapshot().past_sessions, past);
}

#[tokio::test]
async fn test_engagement_falls_back_to_rest() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    Mock::given(method("POST"))
        .and(path("/api/sessions/sess-1/engagement"))
        .and(body_partial_json(json!({
            "student_id": "stu-1",
            "session_id": "sess-1",
            "engagement": "active",
            "focus_level": 70
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Engagement data saved" })))
        .expect(1)
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    student.join_session("AB12CD").await.unwrap();

    let delivery = student
        .update_engagement(StatsUpdate {
            engagement: Some(Engagement::Active),
            focus_level: Some(70),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Rest);
    assert_eq!(student.snapshot().stats.focus_level, Some(70));
}

#[tokio::test]
async fn test_engagement_without_session_stays_local() {
    let server = MockServer::start().await;
    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");

    let delivery = student
        .update_engagement(StatsUpdate {
            emotion: Some("happy".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::LocalOnly);
    assert_eq!(student.snapshot().stats.emotion.as_deref(), Some("happy"));
}

#[tokio::test]
async fn test_refresh_of_ended_session_moves_it_to_past() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json("sess-1", false)))
        .mount(&server)
        .await;

    let student = StudentSession::new(api_client(&server), unreachable_realtime(), "stu-1");
    student.join_session("AB12CD").await.unwrap();
    let refreshed = student.refresh_session().await.unwrap();

    assert!(!refreshed.is_active);
    let state = student.snapshot();
    assert!(state.current_session.is_none());
    assert_eq!(state.past_sessions[0].id, "sess-1");
    assert!(!state.past_sessions[0].is_active);
}

#[tokio::test]
async fn test_realtime_channel_lifecycle() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    let mut backend = WsBackend::start(Vec::new()).await;

    let student = StudentSession::new(api_client(&server), realtime(backend.url()), "stu-1");
    student.join_session("AB12CD").await.unwrap();
    assert!(student.is_connected().await);

    let delivery = student
        .update_engagement(StatsUpdate {
            engagement: Some(Engagement::Passive),
            focus_level: Some(45),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Realtime);

    let (role, message) = backend.next_message().await;
    assert_eq!(role, "student");
    assert_eq!(
        message,
        json!({
            "type": "engagement_update",
            "data": { "engagement": "passive", "focus_level": 45 }
        })
    );

    student.close().await;
    assert!(!student.is_connected().await);
}

#[tokio::test]
async fn test_emotion_result_replaces_stats() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    let mut backend = WsBackend::start(Vec::new()).await;

    let student = StudentSession::new(api_client(&server), realtime(backend.url()), "stu-1");
    let mut rx = student.subscribe();
    student.join_session("AB12CD").await.unwrap();

    // Local stats carry fields the inference result will not
    let delivery = student
        .update_engagement(StatsUpdate {
            raw_emotion: Some("neutral".to_string()),
            confidence: Some(0.91),
            pose: Some(HeadPose {
                yaw: 12.0,
                pitch: -4.0,
                roll: 1.5,
            }),
            focus_level: Some(80),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Realtime);
    backend.next_message().await;
    assert_eq!(student.snapshot().stats.confidence, Some(0.91));

    backend
        .push(
            "sess-1",
            json!({
                "type": "emotion_result",
                "data": { "emotion": "bored", "engagement": "distracted", "focus_level": 12, "face_detected": true },
                "timestamp": "2024-05-02T10:00:00"
            }),
        )
        .await;

    let expected = StudentStats {
        emotion: Some("bored".to_string()),
        engagement: Some(Engagement::Distracted),
        focus_level: Some(12),
        face_detected: Some(true),
        ..Default::default()
    };
    let state = timeout(WAIT, rx.wait_for(|s| s.stats.focus_level == Some(12)))
        .await
        .expect("emotion_result was not applied")
        .unwrap()
        .clone();

    assert_eq!(state.stats, expected);
    assert!(state.stats.raw_emotion.is_none());
    assert!(state.stats.confidence.is_none());
    assert!(state.stats.pose.is_none());

    student.close().await;
}

#[tokio::test]
async fn test_session_update_replaces_current_session() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;

    let mut updated = session_json("sess-1", true);
    updated["subject"] = json!("Organic Chemistry");
    let mut other = session_json("sess-2", true);
    other["subject"] = json!("History");

    let backend = WsBackend::start(
        vec![
            json!({ "type": "session_update", "data": other }),
            json!({ "type": "session_update", "data": updated }),
        ],
    )
    .await;

    let student = StudentSession::new(api_client(&server), realtime(backend.url()), "stu-1");
    let mut rx = student.subscribe();
    student.join_session("AB12CD").await.unwrap();

    let state = timeout(
        WAIT,
        rx.wait_for(|s| {
            s.current_session
                .as_ref()
                .map_or(false, |c| c.subject == "Organic Chemistry")
        }),
    )
    .await
    .expect("session_update was not applied")
    .unwrap()
    .clone();

    assert_eq!(state.current_session_id(), Some("sess-1"));
    student.close().await;
}

#[tokio::test]
async fn test_server_close_surfaces_error() {
    let server = MockServer::start().await;
    mount_join(&server, "sess-1").await;
    let backend = WsBackend::closing(Vec::new(), usize::MAX).await;

    let student = StudentSession::new(api_client(&server), realtime(backend.url()), "stu-1");
    let mut rx = student.subscribe();
    student.join_session("AB12CD").await.unwrap();

    let state = timeout(WAIT, rx.wait_for(|s| s.error.is_some()))
        .await
        .expect("transport loss was not reported")
        .unwrap()
        .clone();

    assert!(state.error.unwrap_or_default().contains("closed by server"));
    // The session itself is untouched
    assert_eq!(state.current_session.map(|s| s.id), Some("sess-1".to_string()));
    student.close().await;
}

#[tokio::test]
async fn test_teacher_receives_student_updates() {
    let server = MockServer::start().await;
    let mut backend = WsBackend::start(
        vec![
            json!({
                "type": "student_update",
                "data": { "student_id": "stu-1", "student_name": "Ana", "engagement": "active", "focus_level": 90 },
                "timestamp": "2024-05-02T10:00:00"
            }),
            json!({
                "type": "student_update",
                "data": { "student_id": "stu-2", "student_name": "Ben", "engagement": "distracted", "focus_level": 30 },
                "timestamp": "2024-05-02T10:00:01"
            }),
        ],
    )
    .await;

    let teacher = TeacherSession::new(api_client(&server), realtime(backend.url()), "teacher-1");
    let mut rx = teacher.subscribe();
    let session = serde_json::from_value(session_json("sess-1", true)).unwrap();
    teacher.attach(session).await.unwrap();

    let state = timeout(WAIT, rx.wait_for(|s| s.students.len() == 2))
        .await
        .expect("student updates were not collected")
        .unwrap()
        .clone();

    assert_eq!(state.students["stu-1"].student_name, "Ana");
    assert_eq!(state.average_focus(), Some(60.0));

    teacher.broadcast(json!({ "announcement": "Quiz in 5 minutes" })).await.unwrap();
    let (role, message) = backend.next_message().await;
    assert_eq!(role, "teacher");
    assert_eq!(message["type"], "session_update");
    assert_eq!(message["data"]["announcement"], "Quiz in 5 minutes");

    teacher.close().await;
}

#[tokio::test]
async fn test_teacher_broadcast_requires_connection() {
    let server = MockServer::start().await;
    let teacher = TeacherSession::new(api_client(&server), unreachable_realtime(), "teacher-1");
    let err = teacher.broadcast(json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn test_login_persists_token_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let storage_path = dir.path().join("nested").join("storage.json");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({ "email": "ana@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "token_type": "bearer",
            "user": {
                "id": "stu-1",
                "email": "ana@example.com",
                "name": "Ana",
                "role": "student",
                "created_at": "2024-01-10T08:00:00"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/student/active"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_json("sess-1", true)))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_client_with(&server, TokenStore::open_file(storage_path.clone()).unwrap());
    api.login("ana@example.com", "secret").await.unwrap();

    // A second process picks up the stored credentials
    let reopened = TokenStore::open_file(storage_path).unwrap();
    assert_eq!(reopened.access_token().unwrap().as_deref(), Some("fresh-token"));
    assert_eq!(reopened.user().unwrap().map(|u| u.id), Some("stu-1".to_string()));

    let api = api_client_with(&server, reopened);
    let student = StudentSession::for_signed_in_user(api, unreachable_realtime())
        .await
        .unwrap();
    assert_eq!(student.student_id(), "stu-1");
    assert!(student.load_active_session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_requests_without_token_fail_locally() {
    let server = MockServer::start().await;
    let api = api_client_with(&server, TokenStore::in_memory());

    let err = api.student_sessions().await.unwrap_err();
    assert!(matches!(err, ClientError::MissingToken));
    assert!(err.is_unauthorized());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_export_uses_server_file_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reports/session/sess-1/export"))
        .and(query_param("format", "csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .insert_header("content-disposition", "attachment; filename=chemistry_AB12CD.csv")
                .set_body_bytes(b"student,focus\nAna,90\n".to_vec()),
        )
        .mount(&server)
        .await;

    let api = api_client(&server);
    let file = api.export_session_report("sess-1", ExportFormat::Csv).await.unwrap();

    assert_eq!(file.file_name, "chemistry_AB12CD.csv");
    assert_eq!(file.content_type.as_deref(), Some("text/csv"));
    assert_eq!(file.bytes, b"student,focus\nAna,90\n");
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy" })))
        .mount(&server)
        .await;

    let api = api_client_with(&server, TokenStore::in_memory());
    let body = api.health().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

fn channel(config: RealtimeConfig) -> SessionConnection {
    SessionConnection::for_session(config, "sess-1", ChannelRole::Student, "stu-1")
}

fn opened(session_id: &str, role: &str) -> BackendEvent {
    BackendEvent::Opened {
        session_id: session_id.to_string(),
        role: role.to_string(),
    }
}

fn closed(session_id: &str) -> BackendEvent {
    BackendEvent::Closed {
        session_id: session_id.to_string(),
    }
}

#[tokio::test]
async fn test_channel_reconnects_after_server_close() {
    let mut backend = WsBackend::closing(Vec::new(), 1).await;
    let conn = channel(RealtimeConfig {
        ws_base_url: backend.url(),
        max_reconnect_attempts: 1,
        reconnect_delay: Duration::from_millis(50),
        ..Default::default()
    });

    let connected = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let connected = connected.clone();
        conn.on(EventKind::Connected, move |_| {
            connected.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let errors = errors.clone();
        conn.on(EventKind::Error, move |event| {
            if let ServerEvent::Error { message } = event {
                errors.lock().unwrap().push(message.clone());
            }
        });
    }

    conn.connect().await.unwrap();
    wait_until("a second connected event", || connected.load(Ordering::SeqCst) == 2).await;
    assert!(conn.is_connected());

    assert_eq!(backend.next_lifecycle().await, opened("sess-1", "student"));
    assert_eq!(backend.next_lifecycle().await, closed("sess-1"));
    assert_eq!(backend.next_lifecycle().await, opened("sess-1", "student"));

    let errors = errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("closed by server"), "{}", errors[0]);

    // The fresh socket carries traffic
    conn.send(&ClientMessage::Ping).unwrap();
    assert_eq!(backend.next_message().await.1, json!({ "type": "ping" }));

    conn.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_does_not_reconnect() {
    let mut backend = WsBackend::start(Vec::new()).await;
    let conn = channel(RealtimeConfig {
        ws_base_url: backend.url(),
        max_reconnect_attempts: 3,
        reconnect_delay: Duration::from_millis(20),
        ..Default::default()
    });

    conn.connect().await.unwrap();
    assert_eq!(backend.next_lifecycle().await, opened("sess-1", "student"));

    conn.disconnect().await;
    assert!(!conn.is_connected());
    assert_eq!(backend.next_lifecycle().await, closed("sess-1"));

    sleep(Duration::from_millis(300)).await;
    while let Ok(event) = backend.events.try_recv() {
        assert!(
            !matches!(event, BackendEvent::Opened { .. }),
            "reconnected after disconnect: {:?}",
            event
        );
    }
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn test_heartbeat_pings_the_backend() {
    let mut backend = WsBackend::start(Vec::new()).await;
    let conn = channel(RealtimeConfig {
        ws_base_url: backend.url(),
        heartbeat_interval: Duration::from_secs(1),
        ..Default::default()
    });

    let pongs = Arc::new(AtomicUsize::new(0));
    {
        let pongs = pongs.clone();
        conn.on(EventKind::Pong, move |_| {
            pongs.fetch_add(1, Ordering::SeqCst);
        });
    }

    conn.connect().await.unwrap();
    let (role, message) = backend.next_message().await;
    assert_eq!(role, "student");
    assert_eq!(message, json!({ "type": "ping" }));

    wait_until("a pong", || pongs.load(Ordering::SeqCst) >= 1).await;
    conn.disconnect().await;
}

#[tokio::test]
async fn test_switching_sessions_closes_previous_channel() {
    let server = MockServer::start().await;
    mount_join_code(&server, "AAAAAA", "sess-a").await;
    mount_join_code(&server, "BBBBBB", "sess-b").await;
    let mut backend = WsBackend::start(Vec::new()).await;

    let student = StudentSession::new(api_client(&server), realtime(backend.url()), "stu-1");
    let mut rx = student.subscribe();

    student.join_session("AAAAAA").await.unwrap();
    assert_eq!(backend.next_lifecycle().await, opened("sess-a", "student"));

    student.join_session("BBBBBB").await.unwrap();
    assert_eq!(backend.next_lifecycle().await, closed("sess-a"));
    assert_eq!(backend.next_lifecycle().await, opened("sess-b", "student"));
    assert!(student.is_connected().await);

    let emotion = |focus: u8| {
        json!({
            "type": "emotion_result",
            "data": { "emotion": "neutral", "engagement": "passive", "focus_level": focus }
        })
    };

    // Once this lands, the new channel has also processed its `connected` frame
    backend.push("sess-b", emotion(33)).await;
    timeout(WAIT, rx.wait_for(|s| s.stats.focus_level == Some(33)))
        .await
        .expect("new channel did not deliver")
        .unwrap();

    backend
        .push("sess-a", json!({ "type": "error", "message": "Session ended" }))
        .await;
    backend.push("sess-a", emotion(5)).await;
    backend.push("sess-b", emotion(64)).await;
    timeout(WAIT, rx.wait_for(|s| s.stats.focus_level == Some(64)))
        .await
        .expect("new channel did not deliver")
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let state = student.snapshot();
    assert_eq!(state.current_session_id(), Some("sess-b"));
    assert!(state.error.is_none());
    assert_eq!(state.stats.focus_level, Some(64));

    student.close().await;
    assert_eq!(backend.next_lifecycle().await, closed("sess-b"));
}

#[tokio::test]
async fn test_teacher_attach_failure_sets_error() {
    let server = MockServer::start().await;
    let teacher = TeacherSession::new(api_client(&server), unreachable_realtime(), "teacher-1");
    let session = serde_json::from_value(session_json("sess-1", true)).unwrap();

    let err = teacher.attach(session).await.unwrap_err();

    let state = teacher.snapshot();
    assert_eq!(state.error, Some(err.user_message()));
    assert!(!state.loading);
    assert!(teacher.broadcast(json!({})).await.is_err());
}

#[tokio::test]
async fn test_detect_emotion_posts_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/emotion/detect"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({ "image": "aGVsbG8=" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "emotion": "focused",
            "confidence": 0.8,
            "engagement": "active",
            "focus_level": 82,
            "face_detected": true,
            "timestamp": "2024-05-02T10:00:00",
            "user_id": "stu-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detection = api_client(&server).detect_emotion("aGVsbG8=").await.unwrap();

    assert_eq!(detection.stats.engagement, Some(Engagement::Active));
    assert_eq!(detection.stats.focus_level, Some(82));
    assert_eq!(detection.user_id.as_deref(), Some("stu-1"));
}

#[tokio::test]
async fn test_admin_users_by_role() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/users/role/teacher"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "_id": "teacher-1",
            "email": "rivera@example.com",
            "name": "Ms. Rivera",
            "role": "teacher",
            "created_at": "2024-01-10T08:00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let users = api_client(&server).users_by_role(UserRole::Teacher).await.unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "teacher-1");
    assert_eq!(users[0].role, UserRole::Teacher);
}

#[tokio::test]
async fn test_admin_session_engagement() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/engagement/sess-1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "sess-1",
            "engagement_data": [{ "student_id": "stu-1", "focus_level": 70 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let history = api_client(&server).session_engagement("sess-1").await.unwrap();

    assert_eq!(history["session_id"], "sess-1");
    assert_eq!(history["engagement_data"][0]["focus_level"], 70);
}
