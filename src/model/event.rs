use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::User;

/// Kind of change the backend broadcast about a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Delete,
}

impl std::str::FromStr for Action {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Action::Add),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(EventError::UnknownAction(other.to_string())),
        }
    }
}

/// A server-side mutation notification, as published on the users topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub action: Action,
    pub user: User,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is missing field `{0}`")]
    MissingField(&'static str),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid user record: {0}")]
    InvalidUser(String),
}

impl PushEvent {
    pub fn new(action: Action, user: User) -> Self {
        Self { action, user }
    }

    /// Parse a raw message body.
    ///
    /// Both `action` and `user` must be present and non-null; `action` must be
    /// a string naming one of the known actions.
    pub fn parse(raw: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(raw.trim())?;

        let action = match value.get("action") {
            None | Some(Value::Null) => return Err(EventError::MissingField("action")),
            Some(Value::String(s)) => s.parse::<Action>()?,
            Some(other) => return Err(EventError::UnknownAction(other.to_string())),
        };

        let user = match value.get("user") {
            None | Some(Value::Null) => return Err(EventError::MissingField("user")),
            Some(user) => User::deserialize(user)
                .map_err(|e| EventError::InvalidUser(e.to_string()))?,
        };

        Ok(Self { action, user })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_broadcast() {
        let raw = r#"{"user":{"id":2,"name":"B","phone":"2"},"action":"add"}"#;
        let event = PushEvent::parse(raw).unwrap();
        assert_eq!(event.action, Action::Add);
        assert_eq!(event.user, User::with_id(2, "B", "2"));
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        let raw = "{\"action\":\"delete\",\"user\":{\"id\":4,\"name\":\"\",\"phone\":\"\"}}\n";
        let event = PushEvent::parse(raw).unwrap();
        assert_eq!(event.action, Action::Delete);
        assert_eq!(event.user.id, Some(4));
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(matches!(PushEvent::parse("not json"), Err(EventError::InvalidJson(_))));
        assert!(matches!(
            PushEvent::parse(r#"{"user":{"id":1,"name":"A","phone":"1"}}"#),
            Err(EventError::MissingField("action"))
        ));
        assert!(matches!(
            PushEvent::parse(r#"{"action":"add"}"#),
            Err(EventError::MissingField("user"))
        ));
        assert!(matches!(
            PushEvent::parse(r#"{"action":"upsert","user":{"id":1,"name":"A","phone":"1"}}"#),
            Err(EventError::UnknownAction(_))
        ));
        assert!(matches!(
            PushEvent::parse(r#"{"action":"add","user":"bob"}"#),
            Err(EventError::InvalidUser(_))
        ));
    }

    #[test]
    fn test_event_json_uses_lowercase_action() {
        let event = PushEvent::new(Action::Update, User::with_id(1, "A", "1"));
        let json: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["action"], "update");
    }
}
