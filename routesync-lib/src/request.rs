//! Route requests handed to [`RouteOps`](crate::route_ops::RouteOps).
//!
//! All family-specific field suppression is decided by [`field_policy`].

use cidr::{Family, IpCidr};

use std::net::IpAddr;

use crate::route::{RouteSpec, Scope, addr_family};

/// What a request is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// The route itself.
    Install,
    /// The on-link host route that makes a gateway reachable.
    Nexthop,
    Delete,
}

/// Which optional fields a request may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldPolicy {
    pub gateway: bool,
    pub source: bool,
    pub scope: bool,
}

impl FieldPolicy {
    const ALL: FieldPolicy = FieldPolicy {
        gateway: true,
        source: true,
        scope: true,
    };
    const SCOPE_ONLY: FieldPolicy = FieldPolicy {
        gateway: false,
        source: false,
        scope: true,
    };
    const NONE: FieldPolicy = FieldPolicy {
        gateway: false,
        source: false,
        scope: false,
    };
}

/// Per-family kernel quirks in one place.
///
/// - IPv6 routes installed with a scope are reported back without it, so a
///   scoped IPv6 nexthop route would never be found again.
/// - Deleting an IPv6 route fails to match when gateway or source are given.
/// - The scope can only be used to select IPv4 routes for deletion.
pub fn field_policy(kind: RequestKind, family: Family) -> FieldPolicy {
    match (kind, family) {
        (RequestKind::Install, _) => FieldPolicy::ALL,
        (RequestKind::Nexthop, Family::Ipv4) => FieldPolicy::SCOPE_ONLY,
        (RequestKind::Nexthop, Family::Ipv6) => FieldPolicy::NONE,
        (RequestKind::Delete, Family::Ipv4) => FieldPolicy::SCOPE_ONLY,
        (RequestKind::Delete, Family::Ipv6) => FieldPolicy::NONE,
    }
}

/// Route request decoupled from the netlink wire format.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub family: Family,
    /// `None` for the default route.
    pub destination: Option<IpCidr>,
    pub if_index: u32,
    pub gateway: Option<IpAddr>,
    pub source: Option<IpAddr>,
    pub mtu: Option<u32>,
    pub scope: Option<Scope>,
}

/// The kernel reports a default route without destination.
fn destination(prefix: IpCidr) -> Option<IpCidr> {
    (prefix.network_length() > 0).then_some(prefix)
}

fn build(kind: RequestKind, spec: &RouteSpec, if_index: u32) -> RouteRequest {
    let policy = field_policy(kind, spec.family());
    RouteRequest {
        family: spec.family(),
        destination: destination(spec.prefix()),
        if_index,
        gateway: spec.nexthop().filter(|_| policy.gateway),
        source: spec.local().filter(|_| policy.source),
        mtu: None,
        scope: spec.scope().filter(|_| policy.scope),
    }
}

pub fn install(spec: &RouteSpec, if_index: u32) -> RouteRequest {
    RouteRequest {
        mtu: spec.mtu(),
        ..build(RequestKind::Install, spec, if_index)
    }
}

pub fn delete(spec: &RouteSpec, if_index: u32) -> RouteRequest {
    build(RequestKind::Delete, spec, if_index)
}

/// On-link route for `gateway` through `if_index`: host prefix, no gateway.
pub fn nexthop(gateway: IpAddr, if_index: u32) -> RouteRequest {
    let family = addr_family(&gateway);
    let policy = field_policy(RequestKind::Nexthop, family.clone());
    RouteRequest {
        family,
        destination: Some(IpCidr::new_host(gateway)),
        if_index,
        gateway: None,
        source: None,
        mtu: None,
        scope: policy.scope.then_some(Scope::LINK),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn full_spec(prefix: &str, nexthop: &str, local: &str) -> anyhow::Result<RouteSpec> {
        Ok(RouteSpec::new(prefix.parse()?, "eth0")
            .with_nexthop(nexthop.parse()?)?
            .with_local(local.parse()?)?
            .with_mtu(1500)
            .with_scope(Scope::SITE))
    }

    #[rstest]
    #[case("10.1.0.0/16", "10.0.0.1", "10.1.0.5")]
    #[case("fd00:1::/64", "fd00::1", "fd00:1::5")]
    fn install_request_carries_every_field(
        #[case] prefix: &str,
        #[case] nexthop: &str,
        #[case] local: &str,
    ) -> anyhow::Result<()> {
        let spec = full_spec(prefix, nexthop, local)?;

        let req = install(&spec, 7);

        assert_eq!(req.destination, Some(prefix.parse()?));
        assert_eq!(req.if_index, 7);
        assert_eq!(req.gateway, Some(nexthop.parse()?));
        assert_eq!(req.source, Some(local.parse()?));
        assert_eq!(req.mtu, Some(1500));
        assert_eq!(req.scope, Some(Scope::SITE));
        Ok(())
    }

    #[test]
    fn ipv6_delete_request_omits_gateway_source_and_scope() -> anyhow::Result<()> {
        let spec = full_spec("fd00:1::/64", "fd00::1", "fd00:1::5")?;

        let req = delete(&spec, 3);

        assert_eq!(req.family, Family::Ipv6);
        assert_eq!(req.destination, Some("fd00:1::/64".parse()?));
        assert_eq!(req.gateway, None);
        assert_eq!(req.source, None);
        assert_eq!(req.scope, None);
        assert_eq!(req.mtu, None);
        Ok(())
    }

    #[test]
    fn ipv4_delete_request_keeps_scope_only_when_set() -> anyhow::Result<()> {
        let scoped = full_spec("10.1.0.0/16", "10.0.0.1", "10.1.0.5")?;
        let req = delete(&scoped, 3);
        assert_eq!(req.scope, Some(Scope::SITE));
        assert_eq!(req.gateway, None);
        assert_eq!(req.source, None);

        let unscoped = RouteSpec::new("10.1.0.0/16".parse()?, "eth0").with_nexthop("10.0.0.1".parse()?)?;
        assert_eq!(delete(&unscoped, 3).scope, None);
        Ok(())
    }

    #[test]
    fn nexthop_request_scopes_ipv4_only() -> anyhow::Result<()> {
        let v4 = nexthop("10.0.0.1".parse()?, 2);
        assert_eq!(v4.destination, Some("10.0.0.1/32".parse()?));
        assert_eq!(v4.scope, Some(Scope::LINK));
        assert_eq!(v4.gateway, None);

        let v6 = nexthop("fd00::1".parse()?, 2);
        assert_eq!(v6.destination, Some("fd00::1/128".parse()?));
        assert_eq!(v6.scope, None);
        Ok(())
    }

    #[test]
    fn default_route_has_no_destination() -> anyhow::Result<()> {
        let spec = RouteSpec::new("0.0.0.0/0".parse()?, "eth0");
        let req = install(&spec, 1);
        assert_eq!(req.destination, None);
        assert_eq!(req.family, Family::Ipv4);
        Ok(())
    }
}
