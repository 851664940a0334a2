//! Probabilistic membership filters.

pub mod bloom;

pub use bloom::RemovalMembershipFilter;
