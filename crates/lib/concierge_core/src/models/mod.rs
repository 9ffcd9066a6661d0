//! Domain models shared across the auth, push and store modules.

pub mod auth;
pub mod push;
