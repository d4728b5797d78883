//! Shared CLI presentation utilities.
//!
//! Format-only: no domain decisions are made here.

pub mod report;
pub mod tables;

pub use report::{describe_gateway, format_result_row, print_report};
pub use tables::{format_optional, print_separator, truncate_string};
