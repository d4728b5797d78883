//! Pure helpers with no I/O.

pub mod merge;
pub mod version;

pub use merge::merge_fill_gaps;
pub use version::{VersionConstraint, VersionError, firmware_satisfies, satisfies};
