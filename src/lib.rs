//! Keel - declarative reconciliation core for a CI/CD platform controller
//!
//! Keel converges the Kubernetes objects a build's CI pipeline needs and
//! records the pipeline's progress as conditions on the build's status.
//!
//! # Architecture
//!
//! - A resource handler describes one managed object: whether it is required,
//!   how to read it, create it, update it toward the desired state and delete
//!   it. A generic driver runs every handler once per reconcile.
//! - Desired state is a pure function of the [`context::BuildContext`];
//!   per-kind diff policies decide whether the cluster copy has drifted.
//! - Pipeline callbacks are folded into conditions by [`pipeline::status`].
//!
//! # Modules
//!
//! - [`resource`] - Handler contract, apply driver, diff policies, cluster client
//! - [`handlers`] - Workflow ServiceAccount, Role and RoleBinding handlers
//! - [`pipeline`] - Pipeline steps, events, outputs and status transitions
//! - [`conditions`] - Condition types, reasons and upsert helpers
//! - [`controller`] - Build reconcile entry points and collaborators
//! - [`crd`] - Custom Resource Definitions (Build, Deployment)
//! - [`context`] - Build context and managed labels
//! - [`config`] - Reconciler configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod conditions;
pub mod config;
pub mod context;
pub mod controller;
pub mod crd;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod resource;
pub mod telemetry;

pub use error::Error;
