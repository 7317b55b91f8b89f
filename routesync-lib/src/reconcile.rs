//! Makes the kernel routing table match a [`RouteSpec`].
//!
//! [`Reconciler::replace_route`] runs
//! `resolve device -> ensure nexthop -> check equivalence -> {no-op | install}`
//! and stops at the first failing step. A nexthop failure means the main
//! route is never attempted.
//!
//! Every call reads the current table before acting. The read and the
//! following replace are not atomic, so callers must serialize calls that
//! target the same device.

use std::collections::HashSet;

use crate::error::{Error, Outcome, Phase};
use crate::lookup::lookup;
use crate::mtu::MtuPolicy;
use crate::nexthop;
use crate::request;
use crate::route::{self, RouteSpec};
use crate::route_ops::{self, RouteOps};

/// Generic over `R: RouteOps` so tests can inject mock route operations.
#[derive(Clone)]
pub struct Reconciler<R: RouteOps> {
    ops: R,
    mtu: MtuPolicy,
}

impl<R: RouteOps> Reconciler<R> {
    pub fn new(ops: R, mtu: MtuPolicy) -> Self {
        Self { ops, mtu }
    }

    pub fn ops(&self) -> &R {
        &self.ops
    }

    pub fn mtu_policy(&self) -> &MtuPolicy {
        &self.mtu
    }

    /// Adds or replaces `route` if necessary.
    pub async fn replace_route(&self, route: &RouteSpec) -> Result<Outcome, Error> {
        let res = self.try_replace_route(route).await;
        match &res {
            Ok(Outcome::Changed) => {
                tracing::info!(
                    prefix = %route.prefix(),
                    nexthop = ?route.nexthop(),
                    local = ?route.local(),
                    interface = route.device(),
                    "updated route"
                );
            }
            Ok(Outcome::Unchanged) => {
                tracing::debug!(prefix = %route.prefix(), interface = route.device(), "route already installed");
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    prefix = %route.prefix(),
                    nexthop = ?route.nexthop(),
                    local = ?route.local(),
                    interface = route.device(),
                    "unable to add route"
                );
            }
        }
        res
    }

    async fn try_replace_route(&self, route: &RouteSpec) -> Result<Outcome, Error> {
        let if_index = self.resolve_device(route, Phase::MainRoute).await?;

        if route.nexthop().is_some() {
            nexthop::ensure_nexthop_route(&self.ops, route, if_index)
                .await
                .map_err(|e| Error::NexthopUnavailable {
                    route: route.clone(),
                    phase: Phase::Nexthop,
                    source: Box::new(e),
                })?;
        }

        let mut wanted = route.install_request(if_index);
        if wanted.mtu.is_some() {
            wanted.mtu = Some(self.mtu.select(route));
        }

        let existing = self
            .ops
            .route_list(if_index, wanted.family.clone())
            .await
            .map_err(|source| Error::AdapterQueryFailed {
                route: route.clone(),
                phase: Phase::MainRoute,
                source,
            })?;
        if lookup(&existing, &wanted).is_some() {
            return Ok(Outcome::Unchanged);
        }

        self.ops
            .route_replace(&wanted)
            .await
            .map_err(|source| Error::AdapterMutationFailed {
                route: route.clone(),
                phase: Phase::MainRoute,
                source,
            })?;
        Ok(Outcome::Changed)
    }

    /// Reconciles `routes` most specific first, stopping at the first error.
    ///
    /// Sorts `routes` in place; outcomes are returned in that order.
    pub async fn replace_routes(&self, routes: &mut [RouteSpec]) -> Result<Vec<Outcome>, Error> {
        route::sort_by_mask(routes);
        let mut outcomes = Vec::with_capacity(routes.len());
        for route in routes.iter() {
            outcomes.push(self.replace_route(route).await?);
        }
        Ok(outcomes)
    }

    /// Removes `route`. Deletion is unconditional: no lookup happens first, and
    /// the kernel's answer for a missing route is returned as is.
    pub async fn delete_route(&self, route: &RouteSpec) -> Result<(), Error> {
        let res = self.try_delete_route(route).await;
        match &res {
            Ok(()) => {
                tracing::info!(
                    prefix = %route.prefix(),
                    nexthop = ?route.nexthop(),
                    local = ?route.local(),
                    interface = route.device(),
                    "deleted route"
                );
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    prefix = %route.prefix(),
                    nexthop = ?route.nexthop(),
                    local = ?route.local(),
                    interface = route.device(),
                    "unable to delete route"
                );
            }
        }
        res
    }

    async fn try_delete_route(&self, route: &RouteSpec) -> Result<(), Error> {
        let if_index = self.resolve_device(route, Phase::Delete).await?;
        self.ops
            .route_del(&request::delete(route, if_index))
            .await
            .map_err(|source| Error::AdapterMutationFailed {
                route: route.clone(),
                phase: Phase::Delete,
                source,
            })
    }

    /// Removes the L2 nexthop route of `route`, if it has a gateway.
    pub async fn remove_nexthop(&self, route: &RouteSpec) -> Result<Outcome, Error> {
        if route.nexthop().is_none() {
            return Ok(Outcome::Unchanged);
        }
        let if_index = self.resolve_device(route, Phase::Nexthop).await?;
        let outcome = nexthop::delete_nexthop_route(&self.ops, route, if_index).await?;
        tracing::info!(nexthop = ?route.nexthop(), interface = route.device(), "deleted L2 nexthop route");
        Ok(outcome)
    }

    /// Deletes every route in `routes`, then, with `with_nexthop`, the L2
    /// nexthop route of each distinct device and gateway pair once.
    ///
    /// Keeps going after a failure and returns every error it hit.
    pub async fn delete_routes(&self, routes: &[RouteSpec], with_nexthop: bool) -> Vec<Error> {
        let mut errors = Vec::new();
        for route in routes {
            if let Err(err) = self.delete_route(route).await {
                errors.push(err);
            }
        }
        if !with_nexthop {
            return errors;
        }

        // routes sharing a gateway share its on-link route
        let mut removed = HashSet::new();
        for route in routes {
            let Some(gateway) = route.nexthop() else {
                continue;
            };
            if !removed.insert((route.device(), gateway)) {
                continue;
            }
            if let Err(err) = self.remove_nexthop(route).await {
                errors.push(err);
            }
        }
        errors
    }

    async fn resolve_device(&self, route: &RouteSpec, phase: Phase) -> Result<u32, Error> {
        self.ops.resolve_device(route.device()).await.map_err(|source| match source {
            route_ops::Error::DeviceNotFound(_) => Error::DeviceNotFound {
                route: route.clone(),
                phase,
                source,
            },
            source => Error::AdapterQueryFailed {
                route: route.clone(),
                phase,
                source,
            },
        })
    }
}
