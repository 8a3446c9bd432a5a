//! OAuth2 authorization-code flow with OIDC identity verification.

pub mod flow;
pub mod id_token;
pub mod keys;

pub use flow::{LoginFlow, LoginOutcome, LoginStart};
pub use id_token::{IdTokenVerifier, IdentityClaims};
pub use keys::KeyResolver;
