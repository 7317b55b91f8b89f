//! Ensures the L2 route that makes a gateway reachable behind its device.
//!
//! A route via gateway `G` on device `D` can only be installed once `G/32`
//! (or `G/128`) is on-link on `D`. The resolver looks for that host route and
//! installs it when missing.

use crate::error::{Error, Outcome, Phase};
use crate::lookup::lookup;
use crate::request;
use crate::route::RouteSpec;
use crate::route_ops::RouteOps;

/// Verifies that the L2 route for the gateway of `route` is installed on
/// interface `if_index`, replacing it when unavailable or incorrect.
///
/// Returns [`Outcome::Unchanged`] for routes without a gateway.
pub async fn ensure_nexthop_route<R: RouteOps>(ops: &R, route: &RouteSpec, if_index: u32) -> Result<Outcome, Error> {
    let Some(gateway) = route.nexthop() else {
        return Ok(Outcome::Unchanged);
    };
    let nexthop_route = request::nexthop(gateway, if_index);

    let existing = ops
        .route_list(if_index, nexthop_route.family.clone())
        .await
        .map_err(|source| Error::AdapterQueryFailed {
            route: route.clone(),
            phase: Phase::Nexthop,
            source,
        })?;
    if lookup(&existing, &nexthop_route).is_some() {
        return Ok(Outcome::Unchanged);
    }

    if let Err(source) = ops.route_replace(&nexthop_route).await {
        tracing::error!(error = %source, nexthop = %gateway, interface = route.device(), "unable to add L2 nexthop route");
        return Err(Error::AdapterMutationFailed {
            route: route.clone(),
            phase: Phase::Nexthop,
            source,
        });
    }

    tracing::info!(nexthop = %gateway, interface = route.device(), "added L2 nexthop route");
    Ok(Outcome::Changed)
}

/// Deletes the L2 route for the gateway of `route`.
///
/// Deletion is unconditional; a missing route is reported by the kernel.
pub async fn delete_nexthop_route<R: RouteOps>(ops: &R, route: &RouteSpec, if_index: u32) -> Result<Outcome, Error> {
    let Some(gateway) = route.nexthop() else {
        return Ok(Outcome::Unchanged);
    };

    ops.route_del(&request::nexthop(gateway, if_index))
        .await
        .map_err(|source| Error::AdapterMutationFailed {
            route: route.clone(),
            phase: Phase::Nexthop,
            source,
        })?;
    Ok(Outcome::Changed)
}
