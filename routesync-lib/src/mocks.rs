//! Stateful mock for the [`RouteOps`] abstraction.
//!
//! The mock keeps an actual route table and answers `route_list` from it, so
//! tests can assert on the table _after_ a reconciliation as well as on the
//! ordered sequence of calls that produced it.

#![cfg(test)]

use async_trait::async_trait;
use cidr::Family;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::request::RouteRequest;
use crate::route::Scope;
use crate::route_ops::{Error, KernelRoute, RouteOps};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    ResolveDevice(String),
    RouteList(u32, Family),
    RouteReplace(RouteRequest),
    RouteDel(RouteRequest),
}

#[derive(Debug, Default)]
pub struct RouteTableState {
    /// Interface name -> index.
    pub links: HashMap<String, u32>,
    pub routes: Vec<KernelRoute>,
    pub calls: Vec<Call>,
    /// Map of operation name -> error message. If set, the operation will fail.
    pub fail_on: HashMap<String, String>,
}

impl RouteTableState {
    fn check_fail(&self, op: &str) -> Result<(), Error> {
        if let Some(msg) = self.fail_on.get(op) {
            Err(Error::General(msg.clone()))
        } else {
            Ok(())
        }
    }

    pub fn with_link(mut self, name: &str, index: u32) -> Self {
        self.links.insert(name.to_string(), index);
        self
    }

    pub fn failing(mut self, op: &str) -> Self {
        self.fail_on.insert(op.to_string(), format!("simulated {op} failure"));
        self
    }

    pub fn replaces(&self) -> Vec<&RouteRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::RouteReplace(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<&RouteRequest> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::RouteDel(req) => Some(req),
                _ => None,
            })
            .collect()
    }
}

fn same_key(route: &KernelRoute, req: &RouteRequest) -> bool {
    route.family == req.family && route.destination == req.destination && route.if_index == req.if_index
}

#[derive(Clone)]
pub struct MockRouteOps {
    pub state: Arc<Mutex<RouteTableState>>,
}

impl MockRouteOps {
    pub fn with_state(state: RouteTableState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

#[async_trait]
impl RouteOps for MockRouteOps {
    async fn resolve_device(&self, name: &str) -> Result<u32, Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::ResolveDevice(name.to_string()));
        s.check_fail("resolve_device")?;
        s.links
            .get(name)
            .copied()
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }

    async fn route_list(&self, if_index: u32, family: Family) -> Result<Vec<KernelRoute>, Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::RouteList(if_index, family.clone()));
        s.check_fail("route_list")?;
        Ok(s.routes
            .iter()
            .filter(|r| r.if_index == if_index && r.family == family)
            .cloned()
            .collect())
    }

    async fn route_replace(&self, route: &RouteRequest) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::RouteReplace(route.clone()));
        s.check_fail("route_replace")?;

        s.routes.retain(|r| !same_key(r, route));
        // The kernel does not report the scope of IPv6 routes back.
        let scope = match route.family {
            Family::Ipv4 => route.scope.unwrap_or(Scope::UNIVERSE),
            Family::Ipv6 => Scope::UNIVERSE,
        };
        s.routes.push(KernelRoute {
            family: route.family.clone(),
            destination: route.destination,
            gateway: route.gateway,
            if_index: route.if_index,
            scope,
        });
        Ok(())
    }

    async fn route_del(&self, route: &RouteRequest) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::RouteDel(route.clone()));
        s.check_fail("route_del")?;

        let before = s.routes.len();
        s.routes.retain(|r| {
            !(same_key(r, route)
                && route.scope.is_none_or(|scope| scope == r.scope)
                && route.gateway.is_none_or(|gw| Some(gw) == r.gateway))
        });
        if s.routes.len() == before {
            return Err(Error::General("no such process".into()));
        }
        Ok(())
    }
}
