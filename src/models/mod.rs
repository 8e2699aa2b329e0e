//! Core data models for the identity-document intake service.
//!
//! These entities represent the durable audit descriptor and the
//! authenticated principal. They map cleanly to database tables via
//! `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod document;
pub mod principal;
