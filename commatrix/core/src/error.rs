pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures reported while building a matrix.
///
/// Every variant is fatal for the operation that produced it: no partial matrix is returned. The
/// only failures that are not surfaced through this type are cleanup failures, which are logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cluster API could not be reached or refused a request.
    #[error("cluster API request failed: {context}")]
    Client {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// An object referenced by another object is missing from the snapshot.
    #[error("{kind} {name} not found while resolving {referrer}")]
    Resolution {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    /// An object in the snapshot cannot be expressed as a matrix entry.
    #[error("invalid {kind} {name}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// The execution context for a node could not be acquired.
    #[error("failed to connect to node {node}")]
    Connect {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    /// A remote command exhausted its retry budget.
    #[error("command `{command}` failed on node {node}")]
    Scan {
        node: String,
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// A socket table line does not have the expected structure.
    #[error("node {node}: {reason} in socket entry {line:?}")]
    Parse {
        node: String,
        line: String,
        reason: &'static str,
    },

    /// A listening socket could not be traced to the container that owns it.
    #[error("node {node}: cannot attribute pid {pid}: {reason}")]
    Attribution {
        node: String,
        pid: u32,
        reason: String,
    },

    /// A node scan task ended without producing a result.
    #[error("scan task for node {node} did not complete: {reason}")]
    Task { node: String, reason: String },
}

impl Error {
    pub fn client(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Client {
            context: context.into(),
            source: source.into(),
        }
    }

    /// The node whose scan produced this error, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Connect { node, .. }
            | Self::Scan { node, .. }
            | Self::Parse { node, .. }
            | Self::Attribution { node, .. }
            | Self::Task { node, .. } => Some(node),
            Self::Client { .. } | Self::Resolution { .. } | Self::Invalid { .. } => None,
        }
    }
}
