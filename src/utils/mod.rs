//! Small shared utilities that don't belong to a single component.

pub mod types;
