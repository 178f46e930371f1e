//! Process-wide owner of the push channel connection.
//!
//! At most one [`PushChannel`] exists per manager. It is created on first use
//! and reused by every later caller until [`ConnectionManager::reset`] tears it
//! down.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use super::PushChannel;
use crate::config::ClientConfig;

static GLOBAL: Lazy<ConnectionManager> = Lazy::new(ConnectionManager::new);

#[derive(Default)]
pub struct ConnectionManager {
    channel: Mutex<Option<Arc<PushChannel>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The manager shared by the whole process.
    pub fn global() -> &'static ConnectionManager {
        &GLOBAL
    }

    /// Return the live channel, creating and connecting one if needed.
    ///
    /// A failed connect leaves no channel behind, so the next call retries
    /// from scratch.
    pub async fn get_or_create(&self, config: &ClientConfig) -> Result<Arc<PushChannel>> {
        let mut slot = self.channel.lock().await;

        if let Some(channel) = slot.as_ref() {
            // reconnects only if the broker dropped us
            channel.connect().await?;
            return Ok(channel.clone());
        }

        let channel = Arc::new(PushChannel::from_config(config)?);
        channel.connect().await?;
        *slot = Some(channel.clone());
        Ok(channel)
    }

    /// The current channel, if one has been created.
    pub async fn current(&self) -> Option<Arc<PushChannel>> {
        self.channel.lock().await.clone()
    }

    /// Disconnect and forget the channel.
    pub async fn reset(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.disconnect().await;
        }
    }
}
