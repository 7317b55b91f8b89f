//! Linux [`RouteOps`] backed by rtnetlink.
//!
//! Converts [`RouteRequest`]s into netlink route messages and route dumps back
//! into [`KernelRoute`] snapshots.

use async_trait::async_trait;
use cidr::{Family, IpCidr};
use futures::TryStreamExt;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteMetric, RouteProtocol, RouteType};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::num::NonZeroI32;

use crate::request::RouteRequest;
use crate::route::Scope;
use crate::route_ops::{Error, KernelRoute, RouteOps};

const MAIN_TABLE: u32 = libc::RT_TABLE_MAIN as u32;

/// Production [`RouteOps`] backed by an `rtnetlink::Handle`.
#[derive(Clone)]
pub struct NetlinkRouteOps {
    handle: rtnetlink::Handle,
}

impl NetlinkRouteOps {
    pub fn new(handle: rtnetlink::Handle) -> Self {
        Self { handle }
    }

    /// Opens a netlink socket and spawns its connection task on the current
    /// tokio runtime. The task terminates once every handle is dropped.
    pub fn connect() -> Result<Self, Error> {
        let (conn, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(conn);
        Ok(Self::new(handle))
    }

    fn build_route_message(route: &RouteRequest) -> RouteMessage {
        let mut msg = match route.family {
            Family::Ipv4 => {
                let mut builder = rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default().output_interface(route.if_index);
                if let Some((IpAddr::V4(dst), len)) = route.destination.map(|d| (d.first_address(), d.network_length())) {
                    builder = builder.destination_prefix(dst, len);
                }
                if let Some(IpAddr::V4(gw)) = route.gateway {
                    builder = builder.gateway(gw);
                }
                if let Some(IpAddr::V4(src)) = route.source {
                    builder = builder.pref_source(src);
                }
                if let Some(scope) = route.scope {
                    builder = builder.scope(scope.raw().into());
                }
                builder.build()
            }
            Family::Ipv6 => {
                let mut builder = rtnetlink::RouteMessageBuilder::<Ipv6Addr>::default().output_interface(route.if_index);
                if let Some((IpAddr::V6(dst), len)) = route.destination.map(|d| (d.first_address(), d.network_length())) {
                    builder = builder.destination_prefix(dst, len);
                }
                if let Some(IpAddr::V6(gw)) = route.gateway {
                    builder = builder.gateway(gw);
                }
                if let Some(IpAddr::V6(src)) = route.source {
                    builder = builder.pref_source(src);
                }
                if let Some(scope) = route.scope {
                    builder = builder.scope(scope.raw().into());
                }
                builder.build()
            }
        };
        if let Some(mtu) = route.mtu {
            msg.attributes.push(RouteAttribute::Metrics(vec![RouteMetric::Mtu(mtu)]));
        }
        msg
    }

    /// Parses a dump entry. Only unicast routes of the main table are
    /// returned; policy tables and the local table are skipped.
    fn route_message_to_kernel_route(msg: &RouteMessage) -> Option<KernelRoute> {
        let family = match msg.header.address_family {
            AddressFamily::Inet => Family::Ipv4,
            AddressFamily::Inet6 => Family::Ipv6,
            _ => return None,
        };

        // table ids above 255 only travel in RTA_TABLE
        let table_id = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Table(id) => Some(*id),
                _ => None,
            })
            .unwrap_or(u32::from(msg.header.table));
        if table_id != MAIN_TABLE || msg.header.kind != RouteType::Unicast {
            return None;
        }

        let if_index = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Oif(idx) => Some(*idx),
            _ => None,
        })?;

        let destination = msg
            .attributes
            .iter()
            .find_map(|a| match a {
                RouteAttribute::Destination(addr) => route_address(addr),
                _ => None,
            })
            .and_then(|addr| IpCidr::new(addr, msg.header.destination_prefix_length).ok())
            .filter(|cidr| cidr.network_length() > 0);

        let gateway = msg.attributes.iter().find_map(|a| match a {
            RouteAttribute::Gateway(addr) => route_address(addr),
            _ => None,
        });

        Some(KernelRoute {
            family,
            destination,
            gateway,
            if_index,
            scope: Scope::new(msg.header.scope.into()),
        })
    }
}

fn route_address(addr: &RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(ip) => Some(IpAddr::V4(*ip)),
        RouteAddress::Inet6(ip) => Some(IpAddr::V6(*ip)),
        _ => None,
    }
}

fn is_no_such_device(err: &rtnetlink::Error) -> bool {
    matches!(
        err,
        rtnetlink::Error::NetlinkError(msg) if msg.code.map(NonZeroI32::get) == Some(-libc::ENODEV)
    )
}

#[async_trait]
impl RouteOps for NetlinkRouteOps {
    async fn resolve_device(&self, name: &str) -> Result<u32, Error> {
        let links: Result<Vec<_>, _> = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute()
            .try_collect()
            .await;

        match links {
            Ok(links) => links
                .first()
                .map(|l| l.header.index)
                .ok_or_else(|| Error::DeviceNotFound(name.to_string())),
            Err(e) if is_no_such_device(&e) => Err(Error::DeviceNotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn route_list(&self, if_index: u32, family: Family) -> Result<Vec<KernelRoute>, Error> {
        let filter = match family {
            Family::Ipv4 => rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default().build(),
            Family::Ipv6 => rtnetlink::RouteMessageBuilder::<Ipv6Addr>::default().build(),
        };
        let routes: Vec<_> = self.handle.route().get(filter).execute().try_collect().await?;

        Ok(routes
            .iter()
            .filter_map(Self::route_message_to_kernel_route)
            .filter(|r| r.if_index == if_index)
            .collect())
    }

    async fn route_replace(&self, route: &RouteRequest) -> Result<(), Error> {
        let msg = Self::build_route_message(route);
        self.handle.route().add(msg).replace().execute().await?;
        Ok(())
    }

    async fn route_del(&self, route: &RouteRequest) -> Result<(), Error> {
        let mut msg = Self::build_route_message(route);
        // match routes regardless of the protocol that installed them
        msg.header.protocol = RouteProtocol::Unspec;
        self.handle.route().del(msg).execute().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::request;
    use crate::route::RouteSpec;

    #[test]
    fn builds_install_message_with_all_attributes() -> anyhow::Result<()> {
        let spec = RouteSpec::new("10.1.0.0/16".parse()?, "eth0")
            .with_nexthop("10.0.0.1".parse()?)?
            .with_local("10.1.0.5".parse()?)?
            .with_scope(Scope::SITE);
        let mut req = request::install(&spec, 3);
        req.mtu = Some(1450);

        let msg = NetlinkRouteOps::build_route_message(&req);

        assert_eq!(msg.header.destination_prefix_length, 16);
        assert_eq!(u8::from(msg.header.scope), 200);
        assert!(msg.attributes.contains(&RouteAttribute::Oif(3)));
        assert!(
            msg.attributes
                .contains(&RouteAttribute::Gateway(RouteAddress::Inet("10.0.0.1".parse()?)))
        );
        assert!(
            msg.attributes
                .contains(&RouteAttribute::PrefSource(RouteAddress::Inet("10.1.0.5".parse()?)))
        );
        assert!(msg.attributes.contains(&RouteAttribute::Metrics(vec![RouteMetric::Mtu(1450)])));
        Ok(())
    }

    #[test]
    fn ipv6_delete_message_has_no_gateway_or_source() -> anyhow::Result<()> {
        let spec = RouteSpec::new("fd00:1::/64".parse()?, "eth0")
            .with_nexthop("fd00::1".parse()?)?
            .with_local("fd00:1::5".parse()?)?;

        let msg = NetlinkRouteOps::build_route_message(&request::delete(&spec, 3));

        assert_eq!(msg.header.address_family, AddressFamily::Inet6);
        assert!(
            !msg.attributes
                .iter()
                .any(|a| matches!(a, RouteAttribute::Gateway(_) | RouteAttribute::PrefSource(_)))
        );
        Ok(())
    }

    #[test]
    fn parses_route_dump_entries() -> anyhow::Result<()> {
        let spec = RouteSpec::new("fd00:1::/64".parse()?, "eth0").with_nexthop("fd00::1".parse()?)?;
        let msg = NetlinkRouteOps::build_route_message(&request::install(&spec, 5));

        let route = NetlinkRouteOps::route_message_to_kernel_route(&msg).expect("has output interface");

        assert_eq!(route.family, Family::Ipv6);
        assert_eq!(route.destination, Some("fd00:1::/64".parse()?));
        assert_eq!(route.gateway, Some("fd00::1".parse()?));
        assert_eq!(route.if_index, 5);
        assert_eq!(route.scope, Scope::UNIVERSE);
        Ok(())
    }

    #[test]
    fn skips_routes_outside_main_table() -> anyhow::Result<()> {
        let spec = RouteSpec::new("10.1.0.0/16".parse()?, "eth0").with_nexthop("10.0.0.1".parse()?)?;

        let mut policy_table = NetlinkRouteOps::build_route_message(&request::install(&spec, 2));
        policy_table.header.table = 100;
        assert_eq!(NetlinkRouteOps::route_message_to_kernel_route(&policy_table), None);

        let mut large_table = NetlinkRouteOps::build_route_message(&request::install(&spec, 2));
        large_table.attributes.push(RouteAttribute::Table(1000));
        assert_eq!(NetlinkRouteOps::route_message_to_kernel_route(&large_table), None);

        let mut main_attr = NetlinkRouteOps::build_route_message(&request::install(&spec, 2));
        main_attr.attributes.push(RouteAttribute::Table(MAIN_TABLE));
        assert!(NetlinkRouteOps::route_message_to_kernel_route(&main_attr).is_some());
        Ok(())
    }

    #[test]
    fn local_table_broadcast_entry_does_not_satisfy_nexthop() -> anyhow::Result<()> {
        let wanted = request::nexthop("10.0.0.255".parse()?, 2);
        let mut msg = NetlinkRouteOps::build_route_message(&wanted);
        msg.header.table = libc::RT_TABLE_LOCAL;
        msg.header.kind = RouteType::Broadcast;

        let dumped: Vec<_> = NetlinkRouteOps::route_message_to_kernel_route(&msg).into_iter().collect();

        assert!(dumped.is_empty());
        assert!(crate::lookup::lookup(&dumped, &wanted).is_none());
        Ok(())
    }

    #[test]
    fn skips_non_unicast_main_table_entries() -> anyhow::Result<()> {
        let spec = RouteSpec::new("10.9.0.0/16".parse()?, "eth0");
        let mut msg = NetlinkRouteOps::build_route_message(&request::install(&spec, 2));
        msg.header.kind = RouteType::Unreachable;

        assert_eq!(NetlinkRouteOps::route_message_to_kernel_route(&msg), None);
        Ok(())
    }

    #[test]
    fn default_route_dump_entry_has_no_destination() -> anyhow::Result<()> {
        let msg = rtnetlink::RouteMessageBuilder::<Ipv4Addr>::default()
            .output_interface(2)
            .gateway("192.168.1.1".parse()?)
            .build();

        let route = NetlinkRouteOps::route_message_to_kernel_route(&msg).expect("has output interface");

        assert_eq!(route.destination, None);
        assert_eq!(route.gateway, Some("192.168.1.1".parse()?));
        Ok(())
    }
}
