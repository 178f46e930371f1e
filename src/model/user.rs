use serde::{Deserialize, Serialize};

/// Backend-assigned identifier of a user record.
pub type UserId = i64;

/// A user record as exchanged with the backend.
///
/// `id` is `None` until the backend has stored the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<UserId>,
    pub name: String,
    pub phone: String,
}

impl User {
    /// An unsaved record, ready to be sent to `POST /users`.
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            phone: phone.into(),
        }
    }

    pub fn with_id(id: UserId, name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            phone: phone.into(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}
