use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, hash::Hash, num::NonZeroU16, str::FromStr};

/// Describes a single listener that a node exposes.
///
/// Entries are immutable facts: each one is produced by exactly one resolver and is never updated
/// once it has been placed into a [`Matrix`](crate::Matrix).
///
/// Equality and hashing use the entry's *full identity*: every field except [`Entry::source`]. Use
/// [`Entry::narrow_key`] to compare entries by role, protocol and port only.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub direction: Direction,

    pub protocol: Protocol,

    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: NonZeroU16,

    /// The node role(s) that expose this listener, e.g. `master` or `master,worker`.
    #[serde(rename = "nodeRole", default)]
    pub role: String,

    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub pod: String,

    #[serde(default)]
    pub container: String,

    /// False when policy may omit this listener without breaking the cluster.
    #[serde(default = "required_default")]
    pub required: bool,

    /// Which resolver produced this entry. Reporting only; never part of identity.
    #[serde(default)]
    pub source: Source,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Direction {
    #[default]
    #[serde(alias = "ingress")]
    Ingress,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Protocol {
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Derived from the cluster's endpoint slices.
    Declared,
    /// Derived from a node's live socket tables.
    Observed,
    /// Supplied by the user.
    #[default]
    Custom,
    /// Part of the always-present catalog.
    Static,
}

/// Borrowed view of every identity-bearing field of an [`Entry`].
///
/// Field order determines the matrix sort order: role, protocol, port, then the rest.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FullKey<'e> {
    pub role: &'e str,
    pub protocol: Protocol,
    pub port: NonZeroU16,
    pub direction: Direction,
    pub service: &'e str,
    pub namespace: &'e str,
    pub pod: &'e str,
    pub container: &'e str,
    pub required: bool,
}

/// Borrowed view of the fields compared when diffing two matrices.
///
/// Two entries that expose the same port on the same role are the same fact for diff purposes,
/// whichever service they are attributed to.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NarrowKey<'e> {
    pub role: &'e str,
    pub protocol: Protocol,
    pub port: NonZeroU16,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid protocol {0:?}, expected TCP or UDP")]
pub struct InvalidProtocol(String);

// === impl Entry ===

impl Entry {
    /// Returns an ingress entry for `protocol`/`port` on `role` with no attribution.
    pub fn new(
        protocol: Protocol,
        port: NonZeroU16,
        role: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol,
            port,
            role: role.into(),
            service: String::new(),
            namespace: String::new(),
            pod: String::new(),
            container: String::new(),
            required: true,
            source,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[inline]
    pub fn full_key(&self) -> FullKey<'_> {
        FullKey {
            role: &self.role,
            protocol: self.protocol,
            port: self.port,
            direction: self.direction,
            service: &self.service,
            namespace: &self.namespace,
            pod: &self.pod,
            container: &self.container,
            required: self.required,
        }
    }

    #[inline]
    pub fn narrow_key(&self) -> NarrowKey<'_> {
        NarrowKey {
            role: &self.role,
            protocol: self.protocol,
            port: self.port,
        }
    }

    /// Compares two entries by role, protocol and port only.
    #[inline]
    pub fn narrow_eq(&self, other: &Self) -> bool {
        self.narrow_key() == other.narrow_key()
    }
}

impl PartialEq for Entry {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.full_key() == other.full_key()
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.full_key().hash(state)
    }
}

/// Renders the entry as one CSV row with the columns direction, protocol, port, namespace,
/// service, pod, container, node role and required. Fields holding a separator, a quote or a line
/// break are quoted, so multi-role entries stay a single column.
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},", self.direction, self.protocol, self.port)?;
        for field in [
            &self.namespace,
            &self.service,
            &self.pod,
            &self.container,
            &self.role,
        ] {
            csv_field(f, field)?;
            f.write_str(",")?;
        }
        write!(f, "{}", self.required)
    }
}

fn csv_field(f: &mut fmt::Formatter<'_>, field: &str) -> fmt::Result {
    if field.contains([',', '"', '\n', '\r']) {
        write!(f, "\"{}\"", field.replace('"', "\"\""))
    } else {
        f.write_str(field)
    }
}

fn required_default() -> bool {
    true
}

/// Custom entry files written by hand often quote ports; accept both forms.
fn port_from_number_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<NonZeroU16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(NonZeroU16),
        String(String),
    }

    match Port::deserialize(de)? {
        Port::Number(port) => Ok(port),
        Port::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// === impl Direction ===

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "Ingress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Protocol ===

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = InvalidProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(InvalidProtocol(s.to_string()))
        }
    }
}

// === impl Source ===

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declared => f.write_str("declared"),
            Self::Observed => f.write_str("observed"),
            Self::Custom => f.write_str("custom"),
            Self::Static => f.write_str("static"),
        }
    }
}
