//! Filesystem-facing pieces shared by both roles: traversal, glob filters,
//! and the protected-path deny list.

pub mod filter;
pub mod protection;
pub mod walker;
