//! Real-time connection hub
//!
//! - `coordinator` - the single task owning the live-session registry
//! - `session` - reader/writer pump for one authenticated socket
//! - `envelope` - the `{type, data}` frames fanned out to clients

pub mod coordinator;
pub mod envelope;
pub mod session;

pub use coordinator::{spawn_hub, HubHandle, Session};
pub use envelope::{ChatMessage, Envelope, EventType, Frame};
pub use session::{serve_socket, SessionConfig, SessionEnd};
