//! API Module
//!
//! Provides the REST API for volume provisioning.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
