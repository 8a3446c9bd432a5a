#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the authgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod session;
pub mod settings;
pub mod storage;
pub mod utils;

/// Re-export commonly used items
pub use error::AuthError;
pub use oauth::{IdTokenVerifier, KeyResolver, LoginFlow};
pub use session::{AuthenticatedUser, SessionService};
pub use settings::AuthSettings;
pub use storage::{MemoryUserStore, UserStore};
