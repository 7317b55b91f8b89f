//! Decides whether an installed route already satisfies a request.

use cidr::IpCidr;

use crate::request::RouteRequest;
use crate::route::{Scope, family_bits};
use crate::route_ops::KernelRoute;

/// Finds the first route in `existing` equivalent to `wanted`.
///
/// Compares destination, gateway, device index and scope. Source address and
/// MTU are not part of the comparison.
pub fn lookup<'a>(existing: &'a [KernelRoute], wanted: &RouteRequest) -> Option<&'a KernelRoute> {
    existing.iter().find(|route| equivalent(route, wanted))
}

pub fn equivalent(route: &KernelRoute, wanted: &RouteRequest) -> bool {
    let destination = match (route.destination, wanted.destination) {
        (Some(have), Some(want)) => mask(&have) == mask(&want) && have.first_address() == want.first_address(),
        (None, None) => route.family == wanted.family,
        _ => false,
    };

    destination
        && route.gateway == wanted.gateway
        && route.if_index == wanted.if_index
        && route.scope == wanted.scope.unwrap_or(Scope::UNIVERSE)
}

/// Mask length and mask bit width.
fn mask(cidr: &IpCidr) -> (u8, u8) {
    (cidr.network_length(), family_bits(cidr.family()))
}
