//! Abstraction over the kernel routing table.
//!
//! Defines the [`RouteOps`] capability trait the reconciler is written
//! against, and the [`KernelRoute`] snapshot type it returns.
//!
//! Implementations:
//! - Linux: [`NetlinkRouteOps`](crate::netlink_ops::NetlinkRouteOps) via rtnetlink
//! - Tests: a stateful in-memory mock (see `mocks` module)
//!
//! No implementation retries; every error is handed straight back.

use async_trait::async_trait;
use cidr::{Family, IpCidr};
use thiserror::Error;

use std::net::IpAddr;

use crate::request::RouteRequest;
use crate::route::Scope;

#[derive(Debug, Error)]
pub enum Error {
    #[error("interface {0} not found")]
    DeviceNotFound(String),
    #[cfg(target_os = "linux")]
    #[error(transparent)]
    Netlink(#[from] rtnetlink::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("{0}")]
    General(String),
}

/// Route as currently installed in the kernel.
///
/// Always a snapshot: it is fetched again on every reconciliation call.
#[derive(Clone, Debug, PartialEq)]
pub struct KernelRoute {
    pub family: Family,
    /// `None` for a default route.
    pub destination: Option<IpCidr>,
    pub gateway: Option<IpAddr>,
    pub if_index: u32,
    pub scope: Scope,
}

/// Kernel route query/mutate capability.
///
/// Implementors must be cheaply cloneable (e.g. via `Arc` or because the
/// underlying handle is already reference-counted).
#[async_trait]
pub trait RouteOps: Send + Sync + Clone {
    /// Resolve an interface name to its index.
    /// Unknown names yield [`Error::DeviceNotFound`].
    async fn resolve_device(&self, name: &str) -> Result<u32, Error>;

    /// List routes of the given family attached to interface `if_index`.
    async fn route_list(&self, if_index: u32, family: Family) -> Result<Vec<KernelRoute>, Error>;

    /// Install the route, overwriting a route with the same key.
    async fn route_replace(&self, route: &RouteRequest) -> Result<(), Error>;

    async fn route_del(&self, route: &RouteRequest) -> Result<(), Error>;
}
