//! Desired-state route specification and its precedence ordering.
//!
//! A [`RouteSpec`] is a value object built by the caller for every
//! reconciliation request. It holds no resources and is never compared by
//! identity; the kernel-facing comparison lives in [`crate::lookup`].

use cidr::{Family, IpCidr};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::request::{self, RouteRequest};

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("{field} {addr} does not match the address family of prefix {prefix}")]
    FamilyMismatch {
        field: &'static str,
        addr: IpAddr,
        prefix: IpCidr,
    },
    #[error("invalid route scope: {0}")]
    InvalidScope(String),
}

/// Kernel route scope (`rtm_scope`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct Scope(u8);

impl Scope {
    pub const UNIVERSE: Scope = Scope(0);
    pub const SITE: Scope = Scope(200);
    pub const LINK: Scope = Scope(253);
    pub const HOST: Scope = Scope(254);
    pub const NOWHERE: Scope = Scope(255);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl From<u8> for Scope {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<Scope> for u8 {
    fn from(scope: Scope) -> Self {
        scope.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scope::UNIVERSE => write!(f, "universe"),
            Scope::SITE => write!(f, "site"),
            Scope::LINK => write!(f, "link"),
            Scope::HOST => write!(f, "host"),
            Scope::NOWHERE => write!(f, "nowhere"),
            Scope(raw) => write!(f, "{raw}"),
        }
    }
}

impl FromStr for Scope {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "universe" | "global" => Ok(Scope::UNIVERSE),
            "site" => Ok(Scope::SITE),
            "link" => Ok(Scope::LINK),
            "host" => Ok(Scope::HOST),
            "nowhere" => Ok(Scope::NOWHERE),
            other => other
                .parse::<u8>()
                .map(Scope)
                .map_err(|_| SpecError::InvalidScope(s.to_string())),
        }
    }
}

/// Total bit width of addresses of the given family.
pub fn family_bits(family: Family) -> u8 {
    match family {
        Family::Ipv4 => 32,
        Family::Ipv6 => 128,
    }
}

pub fn addr_family(addr: &IpAddr) -> Family {
    match addr {
        IpAddr::V4(_) => Family::Ipv4,
        IpAddr::V6(_) => Family::Ipv6,
    }
}

/// A desired routing table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteSpec {
    prefix: IpCidr,
    nexthop: Option<IpAddr>,
    local: Option<IpAddr>,
    device: String,
    mtu: Option<u32>,
    scope: Option<Scope>,
}

impl RouteSpec {
    pub fn new(prefix: IpCidr, device: impl Into<String>) -> Self {
        Self {
            prefix,
            nexthop: None,
            local: None,
            device: device.into(),
            mtu: None,
            scope: None,
        }
    }

    pub fn with_nexthop(mut self, nexthop: IpAddr) -> Result<Self, SpecError> {
        self.check_family("nexthop", nexthop)?;
        self.nexthop = Some(nexthop);
        Ok(self)
    }

    pub fn with_local(mut self, local: IpAddr) -> Result<Self, SpecError> {
        self.check_family("local", local)?;
        self.local = Some(local);
        Ok(self)
    }

    /// Zero clears the MTU.
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = (mtu != 0).then_some(mtu);
        self
    }

    /// The universe scope is the kernel default and is stored as unset.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = (scope != Scope::UNIVERSE).then_some(scope);
        self
    }

    fn check_family(&self, field: &'static str, addr: IpAddr) -> Result<(), SpecError> {
        if addr_family(&addr) == self.family() {
            Ok(())
        } else {
            Err(SpecError::FamilyMismatch {
                field,
                addr,
                prefix: self.prefix,
            })
        }
    }

    pub fn prefix(&self) -> IpCidr {
        self.prefix
    }

    pub fn nexthop(&self) -> Option<IpAddr> {
        self.nexthop
    }

    pub fn local(&self) -> Option<IpAddr> {
        self.local
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    pub fn family(&self) -> Family {
        addr_family(&self.prefix.first_address())
    }

    /// Whether the local address lies inside the destination prefix.
    pub fn contains_local(&self) -> bool {
        self.local.is_some_and(|local| self.prefix.contains(&local))
    }

    /// The gateway widened to a host-only prefix (/32 or /128).
    pub fn nexthop_host_prefix(&self) -> Option<IpCidr> {
        self.nexthop.map(IpCidr::new_host)
    }

    /// Request installing this route through the device with index `if_index`.
    ///
    /// The MTU is carried as configured; [`crate::Reconciler`] applies the MTU
    /// policy on top of it.
    pub fn install_request(&self, if_index: u32) -> RouteRequest {
        request::install(self, if_index)
    }

    /// Renders the route as the equivalent `ip route add` invocation.
    pub fn to_ip_command(&self, dev: &str) -> Vec<String> {
        let mut cmd = vec!["ip".to_string()];
        if self.family() == Family::Ipv6 {
            cmd.push("-6".to_string());
        }
        cmd.extend(["route".to_string(), "add".to_string(), self.prefix.to_string()]);
        if let Some(nexthop) = self.nexthop {
            cmd.extend(["via".to_string(), nexthop.to_string()]);
        }
        if let Some(mtu) = self.mtu {
            cmd.extend(["mtu".to_string(), mtu.to_string()]);
        }
        cmd.extend(["dev".to_string(), dev.to_string()]);
        cmd
    }
}

impl fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix)?;
        if let Some(nexthop) = self.nexthop {
            write!(f, " via {nexthop}")?;
        }
        write!(f, " dev {}", self.device)
    }
}

/// Orders routes narrow first: a longer prefix sorts before a shorter one.
pub fn by_mask(a: &RouteSpec, b: &RouteSpec) -> Ordering {
    b.prefix.network_length().cmp(&a.prefix.network_length())
}

/// Stable sort by [`by_mask`]; routes with equal mask length keep their order.
pub fn sort_by_mask(routes: &mut [RouteSpec]) {
    routes.sort_by(by_mask);
}
