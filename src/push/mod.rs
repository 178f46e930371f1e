//! Push channel: STOMP frames over a single WebSocket connection.

pub mod channel;
pub mod frame;
pub mod manager;

pub use channel::{ChannelState, MessageHandler, PushChannel, PushError, Subscription};
pub use frame::{Command, Frame, FrameError};
pub use manager::ConnectionManager;
