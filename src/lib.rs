//! User accounts over HTTP, guarded by bearer tokens.
//!
//! Passwords are stored as Argon2id hashes, tokens are HMAC-signed JWTs with
//! a pinned algorithm, and every per-account route goes through
//! [`auth::gate::AuthGate`], which binds the token's username to the account
//! addressed by the path.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
pub mod users;
