//! Custom Resource Definitions for keel
//!
//! This module contains the logical entities the reconciliation core works on.

mod build;
mod deployment;
mod types;

pub use build::{Build, BuildSpec, BuildStatus};
pub use deployment::{Deployment, DeploymentSpec, DEFAULT_REVISION_HISTORY_LIMIT};
pub use types::{Condition, ConditionStatus, ImageStatus};
