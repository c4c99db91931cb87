//! Provisioning Pipeline
//!
//! - Property resolution against datacenter defaults
//! - Claim-to-job provisioning over an orchestrator backend
//! - Status reconciliation from orchestrator records

pub mod provisioner;
pub mod reconciler;
pub mod resolver;

pub use provisioner::*;
pub use reconciler::*;
pub use resolver::*;
