//! Read-side user directory.
//!
//! User identity is owned by the platform's identity subsystem; the
//! messaging core only mirrors the display fields it needs to materialize
//! messages and conversation views.

mod models;
mod repository;

pub use models::{UserProfile, UserSummary};
pub use repository::UserDirectory;
