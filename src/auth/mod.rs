//! Bearer credential handling: token mint/verify and handshake extraction.

pub mod credentials;
pub mod token;

pub use credentials::{CredentialSource, extract_bearer, extract_bearer_http};
pub use token::{Identity, TokenService};
