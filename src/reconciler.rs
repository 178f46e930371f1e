//! List reconciliation between the REST snapshot and pushed change events.
//!
//! The backend broadcast is the single source of truth. Local create, update
//! and delete requests are commands sent to the backend; they never touch the
//! list. The list only changes when the snapshot arrives or when a change
//! event is received, so every client converges on what the backend
//! broadcast, in the order it was broadcast.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::model::{Action, PushEvent, User, UserId};
use crate::push::{PushChannel, PushError, Subscription};
use crate::transport::UserApi;

/// Ordered user records, at most one per id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordList {
    users: Vec<User>,
}

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a snapshot; a repeated id keeps its first occurrence.
    pub fn from_snapshot(users: Vec<User>) -> Self {
        let mut list = Self::new();
        list.replace(users);
        list
    }

    pub fn replace(&mut self, users: Vec<User>) {
        self.users.clear();
        for user in users {
            if user.id.is_some() && self.contains(user.id) {
                continue;
            }
            self.users.push(user);
        }
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }

    /// Apply one change event. Returns whether the list changed.
    ///
    /// Events for records without an id are ignored.
    pub fn apply(&mut self, event: &PushEvent) -> bool {
        let Some(id) = event.user.id else {
            return false;
        };

        match event.action {
            Action::Add => {
                if self.contains(Some(id)) {
                    return false;
                }
                self.users.insert(0, event.user.clone());
                true
            }
            Action::Update => match self.users.iter_mut().find(|u| u.id == Some(id)) {
                Some(slot) if *slot != event.user => {
                    *slot = event.user.clone();
                    true
                }
                _ => false,
            },
            Action::Delete => {
                let before = self.users.len();
                self.users.retain(|u| u.id != Some(id));
                self.users.len() != before
            }
        }
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == Some(id))
    }

    fn contains(&self, id: Option<UserId>) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn into_vec(self) -> Vec<User> {
        self.users
    }
}

/// Reactive owner of the [`RecordList`] shown by the management page.
///
/// Clones share the same list.
#[derive(Clone)]
pub struct Reconciler {
    api: UserApi,
    state: Arc<watch::Sender<RecordList>>,
}

impl Reconciler {
    /// Starts with an empty list.
    pub fn new(api: UserApi) -> Self {
        Self {
            api,
            state: Arc::new(watch::Sender::new(RecordList::new())),
        }
    }

    pub fn api(&self) -> &UserApi {
        &self.api
    }

    /// Copy of the current list.
    pub fn snapshot(&self) -> RecordList {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change of the list.
    pub fn watch(&self) -> watch::Receiver<RecordList> {
        self.state.subscribe()
    }

    /// Replace the list with the backend's collection.
    ///
    /// Any failure, including a body that is not an array of records,
    /// leaves an empty list rather than stale or partial data.
    pub async fn load_snapshot(&self) {
        let users = match self.api.list().await {
            Ok(Value::Array(items)) => {
                match serde_json::from_value::<Vec<User>>(Value::Array(items)) {
                    Ok(users) => users,
                    Err(e) => {
                        tracing::warn!("snapshot holds malformed records: {}", e);
                        Vec::new()
                    }
                }
            }
            Ok(other) => {
                tracing::warn!("snapshot is not a list, got: {}", other);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("snapshot fetch failed: {}", e);
                Vec::new()
            }
        };

        tracing::debug!("snapshot loaded with {} users", users.len());
        let next = RecordList::from_snapshot(users);
        self.state.send_if_modified(|list| {
            if *list == next {
                return false;
            }
            *list = next;
            true
        });
    }

    /// Handle one raw message body from the users topic.
    ///
    /// Malformed payloads are logged and dropped.
    pub fn on_push_event(&self, raw: &str) {
        match PushEvent::parse(raw) {
            Ok(event) => {
                if event.user.id.is_none() {
                    tracing::warn!("dropping {:?} event for a user without id", event.action);
                    return;
                }
                self.apply_event(&event);
            }
            Err(e) => {
                tracing::warn!("dropping push event: {}; raw body: {}", e, raw);
            }
        }
    }

    /// Apply a parsed event. Returns whether the list changed.
    pub fn apply_event(&self, event: &PushEvent) -> bool {
        let changed = self.state.send_if_modified(|list| list.apply(event));
        tracing::debug!(
            "{:?} user {:?}: {}",
            event.action,
            event.user.id,
            if changed { "applied" } else { "no change" }
        );
        changed
    }

    /// Ask the backend to create `user`. The list changes when the
    /// backend broadcasts the result.
    pub fn request_create(&self, user: User) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.create(&user).await {
                tracing::warn!("create of {:?} failed: {}", user.name, e);
            }
        })
    }

    /// Ask the backend to update `user`.
    pub fn request_update(&self, user: User) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.update(&user).await {
                tracing::warn!("update of user {:?} failed: {}", user.id, e);
            }
        })
    }

    /// Ask the backend to delete user `id`.
    pub fn request_delete(&self, id: UserId) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(e) = api.remove(id).await {
                tracing::warn!("delete of user {} failed: {}", id, e);
            }
        })
    }

    /// Feed events from `topic` on `channel` into this reconciler.
    pub fn attach(&self, channel: &PushChannel, topic: &str) -> Result<Subscription, PushError> {
        let this = self.clone();
        channel.subscribe(topic, move |body| this.on_push_event(body))
    }

    pub fn detach(&self, channel: &PushChannel, subscription: Subscription) -> Result<(), PushError> {
        channel.unsubscribe(subscription)
    }

    /// Subscribe, then load the snapshot.
    ///
    /// Subscribing first means no broadcast sent while the snapshot is in
    /// flight is missed.
    pub async fn mount(
        &self,
        channel: &PushChannel,
        topic: &str,
    ) -> Result<Subscription, PushError> {
        let subscription = self.attach(channel, topic)?;
        self.load_snapshot().await;
        Ok(subscription)
    }
}
