use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A transport network the node can use to reach the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Transport {
    #[serde(rename = "HTTP")]
    Http,
    Tor,
    #[serde(rename = "I2P")]
    I2p,
    Bluetooth,
    #[serde(rename = "WiFi")]
    WifiDirect,
    Satellite,
    #[serde(rename = "FSRadio")]
    FsRadio,
    #[serde(rename = "LiFi")]
    LiFi,
}

impl Transport {
    /// Every transport, in declaration order.
    pub const ALL: [Transport; 8] = [
        Self::Http,
        Self::Tor,
        Self::I2p,
        Self::Bluetooth,
        Self::WifiDirect,
        Self::Satellite,
        Self::FsRadio,
        Self::LiFi,
    ];

    /// Transports that do not depend on internet access, in order of preference.
    pub const NON_INTERNET: [Transport; 5] = [
        Self::Bluetooth,
        Self::WifiDirect,
        Self::Satellite,
        Self::FsRadio,
        Self::LiFi,
    ];

    /// Short display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Tor => "Tor",
            Self::I2p => "I2P",
            Self::Bluetooth => "Bluetooth",
            Self::WifiDirect => "WiFi",
            Self::Satellite => "Satellite",
            Self::FsRadio => "FSRadio",
            Self::LiFi => "LiFi",
        }
    }

    /// Identifier of the transport driver responsible for this transport.
    pub fn driver_id(&self) -> &'static str {
        match self {
            Self::Http => "netmgr.driver.http",
            Self::Tor => "netmgr.driver.tor",
            Self::I2p => "netmgr.driver.i2p",
            Self::Bluetooth => "netmgr.driver.bluetooth",
            Self::WifiDirect => "netmgr.driver.wifi-direct",
            Self::Satellite => "netmgr.driver.satellite",
            Self::FsRadio => "netmgr.driver.fs-radio",
            Self::LiFi => "netmgr.driver.lifi",
        }
    }

    /// Resolve a driver identifier back to its transport.
    pub fn from_driver_id(driver: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.driver_id() == driver)
    }

    /// Whether reaching peers over this transport requires internet access.
    pub fn is_internet(&self) -> bool {
        matches!(self, Self::Http | Self::Tor | Self::I2p)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transport {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownTransport(s.to_string()))
    }
}

/// Connectivity status reported by a transport driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkStatus {
    NotInstalled,
    Waiting,
    Connecting,
    Connected,
    Disconnected,
    Hanging,
    PortConflict,
    Blocked,
    Verified,
    Error,
}

impl NetworkStatus {
    /// Every status, in declaration order.
    pub const ALL: [NetworkStatus; 10] = [
        Self::NotInstalled,
        Self::Waiting,
        Self::Connecting,
        Self::Connected,
        Self::Disconnected,
        Self::Hanging,
        Self::PortConflict,
        Self::Blocked,
        Self::Verified,
        Self::Error,
    ];

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Human-readable description used in state-change logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::Waiting => "waiting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Hanging => "hanging",
            Self::PortConflict => "port conflict",
            Self::Blocked => "blocked",
            Self::Verified => "verified",
            Self::Error => "errored",
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotInstalled => "NOT_INSTALLED",
            Self::Waiting => "WAITING",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnected => "DISCONNECTED",
            Self::Hanging => "HANGING",
            Self::PortConflict => "PORT_CONFLICT",
            Self::Blocked => "BLOCKED",
            Self::Verified => "VERIFIED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Accepts the wire names case-insensitively, with `-` for `_`.
impl FromStr for NetworkStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// The current state of a single transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub transport: Transport,
    pub status: NetworkStatus,
    /// Timestamp supplied by the reporting driver.
    pub reported_at: DateTime<Utc>,
}

impl NetworkState {
    pub fn new(transport: Transport, status: NetworkStatus) -> Self {
        Self {
            transport,
            status,
            reported_at: Utc::now(),
        }
    }
}
