//! MTU selection for installed routes.

use crate::route::RouteSpec;

pub const ETHERNET_MTU: u32 = 1500;

/// Encapsulation overhead of the overlay tunnel.
pub const TUNNEL_OVERHEAD: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MtuPolicy {
    device_mtu: u32,
    route_mtu: u32,
}

impl Default for MtuPolicy {
    fn default() -> Self {
        Self::from_device_mtu(ETHERNET_MTU)
    }
}

impl MtuPolicy {
    pub fn new(device_mtu: u32, route_mtu: u32) -> Self {
        Self { device_mtu, route_mtu }
    }

    /// Derives the route MTU by subtracting the tunnel overhead.
    pub fn from_device_mtu(device_mtu: u32) -> Self {
        Self::new(device_mtu, device_mtu.saturating_sub(TUNNEL_OVERHEAD))
    }

    pub fn device_mtu(&self) -> u32 {
        self.device_mtu
    }

    pub fn route_mtu(&self) -> u32 {
        self.route_mtu
    }

    /// A route covering the local address serves local endpoints and can use
    /// the device MTU. Anything else may cross the tunnel.
    pub fn select(&self, route: &RouteSpec) -> u32 {
        if route.contains_local() {
            self.device_mtu
        } else {
            self.route_mtu
        }
    }
}
