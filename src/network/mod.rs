//! Network Module
//!
//! CIDR arithmetic and scoped address allocation for volume frontends
//! and replicas.

pub mod allocator;
pub mod cidr;

pub use allocator::*;
pub use cidr::*;
