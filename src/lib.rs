//! # user-desk
//!
//! Client for a users backend: a REST accessor for CRUD, a STOMP-over-WebSocket
//! push channel carrying change events, and a reconciler that keeps a local
//! record list in step with those events.
//!
//! The broadcast is the source of truth. Local edits are sent as requests and
//! only show up in the list once the backend announces them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use user_desk::{ClientConfig, ConnectionManager, Reconciler, UserApi};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load(None)?;
//!     let channel = ConnectionManager::global().get_or_create(&config).await?;
//!
//!     let reconciler = Reconciler::new(UserApi::from_config(&config)?);
//!     let _subscription = reconciler.mount(&channel, &config.users_topic).await?;
//!
//!     let mut updates = reconciler.watch();
//!     while updates.changed().await.is_ok() {
//!         println!("{} users", updates.borrow().len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod push;
pub mod reconciler;
pub mod transport;
pub mod ui;

pub use config::ClientConfig;
pub use error::{EnhancedError, ErrorCategory, ReconnectPolicy};
pub use model::{Action, PushEvent, SessionInfo, User, UserId};
pub use push::{ConnectionManager, PushChannel, Subscription};
pub use reconciler::{RecordList, Reconciler};
pub use transport::{TransportError, UserApi};
pub use ui::{ManagementPage, Shell};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
