use crate::{
    attribution::{self, Container},
    ss, Backoff, Connect, Execute,
};
use commatrix_core::{Catalog, Entry, Error, Protocol, Result, Source};
use futures::FutureExt;
use std::{fmt, panic::AssertUnwindSafe};
use tracing::{debug, info_span, warn, Instrument};

/// What a single node scan observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeScan {
    pub node: String,
    pub entries: Vec<Entry>,
    /// The unfiltered TCP socket table.
    pub raw_tcp: String,
    /// The unfiltered UDP socket table.
    pub raw_udp: String,
}

/// How far a node scan got.
///
/// A scan moves `Idle -> Executing(TCP) -> Executing(UDP) -> Parsing -> Attributing -> Done`,
/// alternating between parsing and attributing once per listener. A failure leaves the phase at
/// the step that failed, and that phase is logged. Whether the scan reached `Done` or failed,
/// [`scan_node`] then releases the execution context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Executing(Protocol),
    Parsing(Protocol),
    Attributing(Protocol),
    Done,
}

struct Scan<'a, E: ?Sized> {
    node: &'a str,
    role: &'a str,
    session: &'a E,
    catalog: &'a Catalog,
    backoff: &'a Backoff,
    phase: Phase,
}

/// Scans one node's listening sockets.
///
/// The node's execution context is acquired from `connector` and released once the scan ends,
/// whether it succeeded, failed or panicked. Release failures are logged and do not change the
/// result.
pub async fn scan_node<C>(
    connector: &C,
    node: &str,
    role: &str,
    catalog: &Catalog,
    backoff: &Backoff,
) -> Result<NodeScan>
where
    C: Connect + Sync + ?Sized,
{
    let span = info_span!("scan", %node);
    async move {
        let session = connector
            .connect(node)
            .await
            .map_err(|source| Error::Connect {
                node: node.to_string(),
                source,
            })?;

        let mut scan = Scan {
            node,
            role,
            session: &session,
            catalog,
            backoff,
            phase: Phase::Idle,
        };
        let result = AssertUnwindSafe(scan.run())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::Task {
                    node: node.to_string(),
                    reason: panic_reason(&*panic),
                })
            });
        match &result {
            Ok(out) => debug!(entries = out.entries.len(), "Scan complete"),
            Err(error) => warn!(phase = %scan.phase, %error, "Scan failed"),
        }

        if let Err(error) = connector.release(session).await {
            warn!(%error, "Failed to release execution context");
        }
        result
    }
    .instrument(span)
    .await
}

// === impl Scan ===

impl<E> Scan<'_, E>
where
    E: Execute + Sync + ?Sized,
{
    async fn run(&mut self) -> Result<NodeScan> {
        self.phase = Phase::Executing(Protocol::Tcp);
        let raw_tcp = self.table(Protocol::Tcp).await?;
        self.phase = Phase::Executing(Protocol::Udp);
        let raw_udp = self.table(Protocol::Udp).await?;

        let mut entries = Vec::new();
        for (protocol, table) in [(Protocol::Tcp, &raw_tcp), (Protocol::Udp, &raw_udp)] {
            for line in ss::listeners(protocol, table) {
                entries.push(self.entry(protocol, line).await?);
            }
        }

        self.phase = Phase::Done;
        Ok(NodeScan {
            node: self.node.to_string(),
            entries,
            raw_tcp,
            raw_udp,
        })
    }

    async fn table(&self, protocol: Protocol) -> Result<String> {
        let command = ss::command(protocol);
        let out = attribution::exec(self.session, self.node, command, self.backoff).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Attributes one listener line. Host-level services are named by their process; anything
    /// else is traced to its container.
    async fn entry(&mut self, protocol: Protocol, line: &str) -> Result<Entry> {
        self.phase = Phase::Parsing(protocol);
        let socket = ss::parse(self.node, line)?;

        let mut entry = Entry::new(protocol, socket.port, self.role, Source::Observed);
        if self.catalog.is_host_service(socket.process) {
            entry.service = socket.process.to_string();
        } else {
            let pid = ss::pid(self.node, line)?;
            self.phase = Phase::Attributing(protocol);
            let Container {
                name,
                pod,
                namespace,
            } = attribution::container_of(self.session, self.node, pid, self.backoff).await?;
            entry.service = name.clone();
            entry.container = name;
            entry.pod = pod;
            entry.namespace = namespace;
        }
        entry.required = !self.catalog.is_optional(&entry.service);

        debug!(%protocol, port = %entry.port, service = %entry.service, "Observed listener");
        Ok(entry)
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

// === impl Phase ===

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Executing(p) => write!(f, "executing {}", ss::command(*p)),
            Self::Parsing(p) => write!(f, "parsing {p} sockets"),
            Self::Attributing(p) => write!(f, "attributing {p} sockets"),
            Self::Done => f.write_str("done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_name_the_failing_step() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(
            Phase::Executing(Protocol::Udp).to_string(),
            "executing ss -anplu"
        );
        assert_eq!(
            Phase::Attributing(Protocol::Tcp).to_string(),
            "attributing TCP sockets"
        );
        assert_eq!(Phase::Done.to_string(), "done");
    }
}
