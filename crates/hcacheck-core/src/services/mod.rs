//! Core services built on the ports.

pub mod gateway;
pub mod spec_resolver;

pub use gateway::{GatewayCache, GatewayError, GatewayResolver, find_gateway};
pub use spec_resolver::{SpecError, SpecResolver};
