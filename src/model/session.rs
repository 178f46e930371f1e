use serde::{Deserialize, Serialize};

/// A push-channel session as reported by `GET /ss-users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub subscribed_topics: Vec<String>,
}
