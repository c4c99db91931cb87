//! Domain layer - Claims, resolved properties and port definitions
//!
//! This module defines the core request types and the traits (ports) that
//! orchestrator adapters implement, following hexagonal architecture
//! principles.

pub mod claim;
pub mod ports;
pub mod properties;
pub mod quantity;

pub use claim::*;
pub use ports::*;
pub use properties::*;
pub use quantity::*;
