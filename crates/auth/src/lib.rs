//! `realitycap-auth`: the authorization boundary consumed by the job clients.
//!
//! Clients only need "give me a bearer token right now". How the token is
//! obtained (browser login, service credentials) is outside this crate.

pub mod provider;
pub mod token;

pub use provider::{CachedTokenProvider, StaticTokenProvider, TokenProvider, TokenSource};
pub use token::{AccessToken, AuthError, validate_window};
