//! The admission pipeline, leaf-first: pure validation, principal
//! resolution, key derivation, the storage gateway, and the orchestrator
//! that composes them.

pub mod gateway;
pub mod identity;
pub mod intake;
pub mod keygen;
pub mod validator;
