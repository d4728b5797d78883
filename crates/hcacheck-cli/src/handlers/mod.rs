//! Command handlers.
//!
//! Handlers take the [`crate::CliContext`] (or plain settings when no
//! adapters are needed), call into the library crates and print the result.
//! Formatting lives in [`crate::presentation`].

pub mod check;
pub mod collect;
pub mod gateway;
pub mod paths;
pub mod spec;
pub mod version;
