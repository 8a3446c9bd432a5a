//! Session credential issuance, verification and transport.

pub mod cookie;
pub mod gate;
pub mod token;

pub use gate::AuthenticatedUser;
pub use token::{SessionClaims, SessionIdentity, SessionService};
