pub mod event;
pub mod session;
pub mod user;

pub use event::{Action, EventError, PushEvent};
pub use session::SessionInfo;
pub use user::{User, UserId};
