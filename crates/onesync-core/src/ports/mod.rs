//! Port definitions
//!
//! Interfaces the data-plane depends on but does not implement. Login flows
//! and token persistence live behind [`TokenSupplier`].

pub mod token_supplier;

pub use token_supplier::{StaticToken, TokenSupplier};
