//! Binary interchange formats shared between the client driver and the
//! server-hosted secure enclave.
//!
//! Everything in this crate is a fixed external contract: the enclave-side
//! decoder expects these exact byte layouts, so changes here are protocol
//! changes, not refactorings.

pub mod error;
pub mod keyblob;
pub mod package;

pub use error::WireError;
