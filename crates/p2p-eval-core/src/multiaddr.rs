//! Multi-address strings advertised by nodes.
//!
//! Only as much structure as peer selection needs: the address is kept as an
//! opaque string, and the first network component is inspected to tell
//! loopback addresses apart from routable ones.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

/// A self-describing address such as `/ip4/172.18.0.2/tcp/60000/p2p/16Uiu2...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiAddress(String);

impl MultiAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address points at the loopback interface.
    ///
    /// Peers in other containers cannot dial such an address.
    pub fn is_loopback(&self) -> bool {
        let mut parts = self.0.split('/').filter(|p| !p.is_empty());
        while let Some(protocol) = parts.next() {
            let Some(value) = parts.next() else {
                return false;
            };
            match protocol {
                "ip4" => {
                    return value
                        .parse::<Ipv4Addr>()
                        .map(|ip| ip.is_loopback())
                        .unwrap_or(false);
                }
                "ip6" => {
                    return value
                        .parse::<Ipv6Addr>()
                        .map(|ip| ip.is_loopback())
                        .unwrap_or(false);
                }
                "dns" | "dns4" | "dns6" => return value.eq_ignore_ascii_case("localhost"),
                _ => continue,
            }
        }
        false
    }

    /// Pick the first address that is reachable from other containers.
    pub fn select_routable<'a, I>(candidates: I) -> Option<MultiAddress>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .map(MultiAddress::new)
            .find(|addr| !addr.is_loopback())
    }
}

impl fmt::Display for MultiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MultiAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
