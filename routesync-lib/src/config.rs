use cidr::IpCidr;
use serde::Deserialize;
use thiserror::Error;

use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::mtu::{MtuPolicy, TUNNEL_OVERHEAD};
use crate::route::{RouteSpec, Scope, SpecError};

pub const DEFAULT_PATH: &str = "/etc/routesync/config.toml";
pub const ENV_VAR: &str = "ROUTESYNC_CONFIG_PATH";

const SUPPORTED_VERSION: i64 = 1;
const KNOWN_KEYS: [&str; 3] = ["version", "mtu", "routes"];

#[derive(Debug, PartialEq)]
pub struct Config {
    pub mtu: MtuPolicy,
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration file not found")]
    NoFile,
    #[error("Unable to determine configuration version")]
    VersionNotFound,
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Deserialization error: {0}")]
    TomlDeserialization(#[from] toml::de::Error),
    #[error("Unsupported config version: {0}")]
    VersionMismatch(i64),
    #[error("Invalid prefix {prefix}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },
    #[error("Invalid route {prefix}: {source}")]
    InvalidRoute {
        prefix: String,
        #[source]
        source: SpecError,
    },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    mtu: Option<RawMtu>,
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMtu {
    device: Option<u32>,
    route: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoute {
    prefix: String,
    nexthop: Option<IpAddr>,
    local: Option<IpAddr>,
    device: String,
    mtu: Option<u32>,
    scope: Option<Scope>,
}

impl From<RawMtu> for MtuPolicy {
    fn from(raw: RawMtu) -> Self {
        let device = raw.device.unwrap_or(MtuPolicy::default().device_mtu());
        let route = raw.route.unwrap_or(device.saturating_sub(TUNNEL_OVERHEAD));
        MtuPolicy::new(device, route)
    }
}

impl TryFrom<RawRoute> for RouteSpec {
    type Error = Error;

    fn try_from(raw: RawRoute) -> Result<Self, Self::Error> {
        // host bits are ignored, like `ip route` does
        let prefix = cidr::parsers::parse_cidr_ignore_hostbits::<IpCidr, _>(&raw.prefix, IpAddr::from_str).map_err(|e| {
            Error::InvalidPrefix {
                prefix: raw.prefix.clone(),
                reason: e.to_string(),
            }
        })?;
        let invalid = |source| Error::InvalidRoute {
            prefix: raw.prefix.clone(),
            source,
        };

        let mut route = RouteSpec::new(prefix, raw.device);
        if let Some(nexthop) = raw.nexthop {
            route = route.with_nexthop(nexthop).map_err(invalid)?;
        }
        if let Some(local) = raw.local {
            route = route.with_local(local).map_err(invalid)?;
        }
        if let Some(mtu) = raw.mtu {
            route = route.with_mtu(mtu);
        }
        if let Some(scope) = raw.scope {
            route = route.with_scope(scope);
        }
        Ok(route)
    }
}

pub async fn read(path: &Path) -> Result<Config, Error> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoFile
        } else {
            Error::IO(e)
        }
    })?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config, Error> {
    let table = content.parse::<toml::Table>()?;
    let version = table
        .get("version")
        .and_then(|v| v.as_integer())
        .ok_or(Error::VersionNotFound)?;
    if version != SUPPORTED_VERSION {
        return Err(Error::VersionMismatch(version));
    }

    for key in wrong_keys(&table) {
        tracing::warn!(%key, "ignoring unsupported key in configuration file");
    }

    let raw = toml::from_str::<RawConfig>(content)?;
    let routes = raw
        .routes
        .into_iter()
        .map(RouteSpec::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        mtu: raw.mtu.map(MtuPolicy::from).unwrap_or_default(),
        routes,
    })
}

fn wrong_keys(table: &toml::Table) -> Vec<String> {
    table
        .keys()
        .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
        .cloned()
        .collect()
}
