//! Kernel route reconciliation.
//!
//! Brings a single routing table entry described by a [`RouteSpec`] into the
//! kernel, installing the on-link route for its gateway first and skipping
//! the mutation when an equivalent route is already present.

pub mod config;
pub mod logging;
pub mod lookup;
pub mod mtu;
pub mod nexthop;
pub mod reconcile;
pub mod request;
pub mod route;
pub mod route_ops;

#[cfg(target_os = "linux")]
pub mod netlink_ops;

mod error;
mod mocks;

pub use error::{Error, Outcome, Phase};
pub use reconcile::Reconciler;
pub use route::{RouteSpec, Scope};
