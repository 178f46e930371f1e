//! REST accessor for the users backend.
//!
//! One request per call: no retries, no caching, no batching. Failures come
//! back as [`TransportError`].

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::ClientConfig;
use crate::model::{SessionInfo, User, UserId};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response body: {0}")]
    InvalidBody(String),
    #[error("user has no id")]
    MissingId,
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status { status: 404, .. })
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Answers of the backend's plain-text health endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub greeting: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct UserApi {
    base: Url,
    client: Client,
}

impl UserApi {
    pub fn new(base: Url, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.base()?, config.request_timeout)?)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `GET /users`, returned untouched so callers decide what a bad shape means.
    pub async fn list(&self) -> TransportResult<Value> {
        let response = self.client.get(self.url("users")).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `GET /users` decoded into records.
    pub async fn list_users(&self) -> TransportResult<Vec<User>> {
        decode(self.list().await?)
    }

    /// `GET /users/{id}`
    pub async fn get(&self, id: UserId) -> TransportResult<User> {
        let response = self
            .client
            .get(self.url(&format!("users/{}", id)))
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `POST /users`; any id on `user` is ignored by the backend.
    pub async fn create(&self, user: &User) -> TransportResult<User> {
        let response = self.client.post(self.url("users")).json(user).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `PUT /users/{id}`
    pub async fn update(&self, user: &User) -> TransportResult<User> {
        let id = user.id.ok_or(TransportError::MissingId)?;
        let response = self
            .client
            .put(self.url(&format!("users/{}", id)))
            .json(user)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `DELETE /users/{id}`
    pub async fn remove(&self, id: UserId) -> TransportResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("users/{}", id)))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// `GET /ss-users`: sessions currently connected to the push channel.
    pub async fn active_sessions(&self) -> TransportResult<Vec<SessionInfo>> {
        let response = self.client.get(self.url("ss-users")).send().await?;
        let response = check(response).await?;
        decode(response.json().await?)
    }

    /// `GET /` and `GET /db-check`.
    pub async fn health(&self) -> TransportResult<Health> {
        let greeting = self.text("").await?;
        let database = self.text("db-check").await?;
        Ok(Health { greeting, database })
    }

    async fn text(&self, path: &str) -> TransportResult<String> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(check(response).await?.text().await?)
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let joined = format!("{}/{}", self.base.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(None);
        url
    }
}

async fn check(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> TransportResult<T> {
    serde_json::from_value(value).map_err(|e| TransportError::InvalidBody(e.to_string()))
}
