use thiserror::Error;

use std::fmt;

use crate::route::RouteSpec;
use crate::route_ops;

/// Reconciliation step an error happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Nexthop,
    MainRoute,
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Nexthop => write!(f, "nexthop"),
            Phase::MainRoute => write!(f, "main-route"),
            Phase::Delete => write!(f, "delete"),
        }
    }
}

/// Result of a successful reconciliation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

impl Outcome {
    pub fn is_changed(self) -> bool {
        self == Outcome::Changed
    }
}

/// Terminal reconciliation failure. None of these are retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[{phase}] unable to lookup interface {} for route {route}", .route.device())]
    DeviceNotFound {
        route: RouteSpec,
        phase: Phase,
        #[source]
        source: route_ops::Error,
    },
    #[error("[{phase}] unable to query kernel for route {route}")]
    AdapterQueryFailed {
        route: RouteSpec,
        phase: Phase,
        #[source]
        source: route_ops::Error,
    },
    #[error("[{phase}] unable to modify route {route}")]
    AdapterMutationFailed {
        route: RouteSpec,
        phase: Phase,
        #[source]
        source: route_ops::Error,
    },
    #[error("[{phase}] unable to add L2 nexthop route for route {route}")]
    NexthopUnavailable {
        route: RouteSpec,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn route(&self) -> &RouteSpec {
        match self {
            Error::DeviceNotFound { route, .. }
            | Error::AdapterQueryFailed { route, .. }
            | Error::AdapterMutationFailed { route, .. }
            | Error::NexthopUnavailable { route, .. } => route,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Error::DeviceNotFound { phase, .. }
            | Error::AdapterQueryFailed { phase, .. }
            | Error::AdapterMutationFailed { phase, .. }
            | Error::NexthopUnavailable { phase, .. } => *phase,
        }
    }
}
