//! Session Management Module
//!
//! Issues, validates, renews and revokes session tokens bound to an
//! authenticated identity and the connection they were issued on.

pub mod manager;
pub mod types;

pub use manager::{SessionManager, SweeperHandle};
pub use types::*;
