//! Declaration metadata attached to handlers

pub mod capability;
pub mod schedule;

pub use capability::*;
pub use schedule::*;
