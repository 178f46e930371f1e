//! In-memory users backend for integration tests.
//!
//! Serves the REST endpoints and a minimal STOMP broker on `/ws`, and
//! broadcasts a change event on the users topic after every mutation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use user_desk::config::{ClientConfig, USERS_TOPIC};
use user_desk::model::{Action, PushEvent, SessionInfo, User, UserId};
use user_desk::push::{Command, Frame};

#[derive(Clone)]
struct AppState {
    users: Arc<Mutex<Vec<User>>>,
    next_id: Arc<AtomicI64>,
    list_override: Arc<Mutex<Option<Value>>>,
    broadcasts: Arc<AtomicBool>,
    events: broadcast::Sender<(String, String)>,
    kick: broadcast::Sender<()>,
    sessions: Arc<DashMap<String, SessionInfo>>,
}

impl AppState {
    fn publish(&self, action: Action, user: &User) {
        if !self.broadcasts.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(body) = PushEvent::new(action, user.clone()).to_json() {
            let _ = self.events.send((USERS_TOPIC.to_string(), body));
        }
    }
}

pub struct Backend {
    pub addr: SocketAddr,
    state: AppState,
    server: JoinHandle<()>,
}

impl Backend {
    /// Serve on an ephemeral port with `seed` as the initial users.
    pub async fn start(seed: Vec<User>) -> Self {
        let next = seed.iter().filter_map(|u| u.id).max().unwrap_or(0) + 1;
        let (events, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = AppState {
            users: Arc::new(Mutex::new(seed)),
            next_id: Arc::new(AtomicI64::new(next)),
            list_override: Arc::new(Mutex::new(None)),
            broadcasts: Arc::new(AtomicBool::new(true)),
            events,
            kick,
            sessions: Arc::new(DashMap::new()),
        };

        let app = Router::new()
            .route("/", get(|| async { "Hello from the users backend" }))
            .route("/db-check", get(|| async { "Database connection OK" }))
            .route("/users", get(list_users).post(create_user))
            .route(
                "/users/{id}",
                get(get_user).put(update_user).delete(delete_user),
            )
            .route("/ss-users", get(list_sessions))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind backend");
        let addr = listener.local_addr().expect("backend addr");
        let server = tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url(),
            request_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    pub fn users(&self) -> Vec<User> {
        self.state.users.lock().clone()
    }

    /// Push an arbitrary body on the users topic.
    pub fn broadcast_raw(&self, body: &str) {
        let _ = self
            .state
            .events
            .send((USERS_TOPIC.to_string(), body.to_string()));
    }

    /// Make `GET /users` answer with `body` instead of the stored users.
    pub fn set_list_body(&self, body: Value) {
        *self.state.list_override.lock() = Some(body);
    }

    /// Turn change broadcasts after REST mutations on or off.
    pub fn set_broadcasts(&self, enabled: bool) {
        self.state.broadcasts.store(enabled, Ordering::SeqCst);
    }

    /// Close every push-channel socket from the server side.
    pub fn drop_connections(&self) {
        let _ = self.state.kick.send(());
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn list_users(State(state): State<AppState>) -> Json<Value> {
    if let Some(body) = state.list_override.lock().clone() {
        return Json(body);
    }
    let users = state.users.lock().clone();
    Json(json!(users))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, (StatusCode, &'static str)> {
    state
        .users
        .lock()
        .iter()
        .find(|u| u.id == Some(id))
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "User not found"))
}

async fn create_user(
    State(state): State<AppState>,
    Json(mut user): Json<User>,
) -> (StatusCode, Json<User>) {
    user.id = Some(state.next_id.fetch_add(1, Ordering::SeqCst));
    state.users.lock().push(user.clone());
    state.publish(Action::Add, &user);
    (StatusCode::CREATED, Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(mut user): Json<User>,
) -> Result<Json<User>, (StatusCode, &'static str)> {
    user.id = Some(id);
    {
        let mut users = state.users.lock();
        let slot = users
            .iter_mut()
            .find(|u| u.id == Some(id))
            .ok_or((StatusCode::NOT_FOUND, "User not found"))?;
        *slot = user.clone();
    }
    state.publish(Action::Update, &user);
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    let removed = {
        let mut users = state.users.lock();
        let pos = users
            .iter()
            .position(|u| u.id == Some(id))
            .ok_or((StatusCode::NOT_FOUND, "User not found"))?;
        users.remove(pos)
    };
    state.publish(Action::Delete, &removed);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.iter().map(|s| s.value().clone()).collect())
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let username = query.get("username").cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| handle_ws(state, socket, peer, username))
}

async fn handle_ws(state: AppState, socket: WebSocket, peer: SocketAddr, username: String) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();
    let mut kick = state.kick.subscribe();
    // subscription id -> destination
    let mut subscriptions: HashMap<String, String> = HashMap::new();
    let mut message_id = 0u64;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let Ok(frame) = Frame::parse(text.as_str()) else {
                    continue;
                };

                let reply = match frame.command {
                    Command::Connect | Command::Stomp => {
                        state.sessions.insert(
                            session_id.clone(),
                            SessionInfo {
                                session_id: session_id.clone(),
                                ip: peer.ip().to_string(),
                                port: peer.port(),
                                username: username.clone(),
                                active: true,
                                subscribed_topics: Vec::new(),
                            },
                        );
                        Some(
                            Frame::new(Command::Connected)
                                .header("version", "1.2")
                                .header("user-name", username.as_str()),
                        )
                    }
                    Command::Subscribe => {
                        if let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) {
                            subscriptions.insert(id.to_string(), dest.to_string());
                            if let Some(mut session) = state.sessions.get_mut(&session_id) {
                                session.subscribed_topics.push(dest.to_string());
                            }
                        }
                        None
                    }
                    Command::Unsubscribe => {
                        if let Some(dest) = frame.get("id").and_then(|id| subscriptions.remove(id)) {
                            if let Some(mut session) = state.sessions.get_mut(&session_id) {
                                session.subscribed_topics.retain(|t| *t != dest);
                            }
                        }
                        None
                    }
                    Command::Send => {
                        if let Some(dest) = frame.get("destination") {
                            let _ = state.events.send((dest.to_string(), frame.body.clone()));
                        }
                        None
                    }
                    Command::Disconnect => frame
                        .get("receipt")
                        .map(|r| Frame::new(Command::Receipt).header("receipt-id", r)),
                    _ => Some(
                        Frame::new(Command::Error)
                            .header("message", "unsupported frame")
                            .with_body(frame.command.as_str()),
                    ),
                };

                if let Some(reply) = reply {
                    if sender.send(Message::Text(reply.encode().into())).await.is_err() {
                        break;
                    }
                }
            }
            _ = kick.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => {
                let (destination, body) = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                for (id, dest) in &subscriptions {
                    if *dest != destination {
                        continue;
                    }
                    message_id += 1;
                    let frame = Frame::new(Command::Message)
                        .header("destination", dest.as_str())
                        .header("subscription", id.as_str())
                        .header("message-id", format!("{}-{}", session_id, message_id))
                        .header("content-type", "application/json")
                        .with_body(format!("{}\n", body));
                    if sender.send(Message::Text(frame.encode().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    state.sessions.remove(&session_id);
}
