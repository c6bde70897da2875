//! Parsing of `ss -anpl` socket tables.
//!
//! With a single protocol selected, `ss` prints one socket per line:
//!
//! ```text
//! State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
//! LISTEN 0      4096   0.0.0.0:10250      0.0.0.0:*         users:(("kubelet",pid=2817,fd=20))
//! ```

use commatrix_core::{Error, Protocol, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{net::IpAddr, num::NonZeroU16};

const STATE_FIELD: usize = 0;
const LOCAL_ADDR_FIELD: usize = 3;

static PROCESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"users:\(\("([^"]+)""#).expect("process pattern must compile"));

static PID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pid=(\d+)").expect("pid pattern must compile"));

/// A socket table line that passed the listener filter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Socket<'l> {
    pub port: NonZeroU16,
    pub process: &'l str,
}

/// The command that lists every socket of `protocol` with its owning process.
pub fn command(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "ss -anplt",
        Protocol::Udp => "ss -anplu",
    }
}

/// Returns the lines of `table` that describe non-loopback listeners.
///
/// TCP sockets must be in the `LISTEN` state. UDP has no connection state; `ss` reports sockets
/// that have an active process binding as `ESTAB`, and only those are kept.
pub fn listeners(protocol: Protocol, table: &str) -> impl Iterator<Item = &str> {
    let state = match protocol {
        Protocol::Tcp => "LISTEN",
        Protocol::Udp => "ESTAB",
    };
    table.lines().filter(move |line| {
        let mut fields = line.split_whitespace();
        if fields.nth(STATE_FIELD) != Some(state) {
            return false;
        }
        // A listener line without a local address is kept so that parsing rejects it.
        !fields
            .nth(LOCAL_ADDR_FIELD - STATE_FIELD - 1)
            .is_some_and(is_loopback)
    })
}

/// Extracts the local port and the owning process name from a listener line.
pub fn parse<'l>(node: &str, line: &'l str) -> Result<Socket<'l>> {
    let parse_error = |reason| Error::Parse {
        node: node.to_string(),
        line: line.to_string(),
        reason,
    };

    let local = line
        .split_whitespace()
        .nth(LOCAL_ADDR_FIELD)
        .ok_or_else(|| parse_error("missing local address"))?;
    let (_, port) = local
        .rsplit_once(':')
        .ok_or_else(|| parse_error("missing port"))?;
    let port = port
        .parse::<NonZeroU16>()
        .map_err(|_| parse_error("invalid port"))?;

    let process = PROCESS
        .captures(line)
        .and_then(|c| c.get(1))
        .ok_or_else(|| parse_error("missing process name"))?
        .as_str();

    Ok(Socket { port, process })
}

/// Extracts the owning process id from a listener line.
pub fn pid(node: &str, line: &str) -> Result<u32> {
    PID.captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| Error::Parse {
            node: node.to_string(),
            line: line.to_string(),
            reason: "missing pid",
        })
}

/// Tests the host part of an `ss` local address, e.g. `127.0.0.1:9100`, `[::1]:631`,
/// `127.0.0.53%lo:53` or `*:22`.
fn is_loopback(local: &str) -> bool {
    let host = local.rsplit_once(':').map_or(local, |(host, _)| host);
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.split_once('%').map_or(host, |(addr, _)| addr);
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback(),
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback() || ip.to_ipv4_mapped().is_some_and(|ip| ip.is_loopback())
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCP_TABLE: &str = r#"State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
LISTEN 0      4096   127.0.0.1:9100      0.0.0.0:*         users:(("node_exporter",pid=3001,fd=3))
LISTEN 0      4096   0.0.0.0:10250       0.0.0.0:*         users:(("kubelet",pid=2817,fd=20))
LISTEN 0      128    [::1]:631           [::]:*            users:(("cupsd",pid=900,fd=7))
LISTEN 0      128    [::]:22             [::]:*            users:(("sshd",pid=1012,fd=4))
ESTAB  0      0      10.0.0.5:10250      10.0.0.9:51234    users:(("kubelet",pid=2817,fd=31))
LISTEN 0      4096   *:2379              *:*               users:(("etcd",pid=4100,fd=7))
"#;

    const UDP_TABLE: &str = r#"State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
UNCONN 0      0      0.0.0.0:111         0.0.0.0:*         users:(("rpcbind",pid=800,fd=5))
ESTAB  0      0      127.0.0.53%lo:53    0.0.0.0:*         users:(("systemd-resolve",pid=700,fd=12))
ESTAB  0      0      10.0.0.5:4789       10.0.0.9:4789     users:(("ovs-vswitchd",pid=1200,fd=40))
"#;

    #[test]
    fn tcp_keeps_non_loopback_listeners() {
        let lines = listeners(Protocol::Tcp, TCP_TABLE).collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with("LISTEN")));
        assert!(!lines.iter().any(|l| l.contains("127.0.0.1:9100")));
        assert!(!lines.iter().any(|l| l.contains("[::1]:631")));
    }

    #[test]
    fn udp_keeps_bound_non_loopback_sockets() {
        let lines = listeners(Protocol::Udp, UDP_TABLE).collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("10.0.0.5:4789"));
    }

    #[test]
    fn parses_kubelet_line() {
        let line = "LISTEN 0 4096 0.0.0.0:10250 0.0.0.0:* users:((\"kubelet\",pid=2817,fd=20))";
        let socket = parse("node-0", line).expect("must parse");
        assert_eq!(socket.port.get(), 10250);
        assert_eq!(socket.process, "kubelet");
        assert_eq!(pid("node-0", line).expect("must have a pid"), 2817);
    }

    #[test]
    fn parses_ipv6_and_wildcard_addresses() {
        let socket = parse(
            "node-0",
            "LISTEN 0 128 [::]:22 [::]:* users:((\"sshd\",pid=1012,fd=4))",
        )
        .expect("must parse");
        assert_eq!(socket.port.get(), 22);

        let socket = parse(
            "node-0",
            "LISTEN 0 4096 *:2379 *:* users:((\"etcd\",pid=4100,fd=7))",
        )
        .expect("must parse");
        assert_eq!(socket.port.get(), 2379);
    }

    #[test]
    fn rejects_malformed_lines() {
        for (line, expected) in [
            ("LISTEN 0 4096", "missing local address"),
            ("LISTEN 0 4096 0.0.0.0 0.0.0.0:* users:((\"x\",pid=1,fd=1))", "missing port"),
            ("LISTEN 0 4096 0.0.0.0:0 0.0.0.0:* users:((\"x\",pid=1,fd=1))", "invalid port"),
            ("LISTEN 0 4096 0.0.0.0:http 0.0.0.0:*", "invalid port"),
            ("LISTEN 0 4096 0.0.0.0:8080 0.0.0.0:*", "missing process name"),
        ] {
            match parse("node-0", line) {
                Err(Error::Parse { node, reason, .. }) => {
                    assert_eq!(node, "node-0");
                    assert_eq!(reason, expected, "{line}");
                }
                res => panic!("{line}: unexpected result {res:?}"),
            }
        }

        assert!(matches!(
            pid("node-0", "LISTEN 0 4096 0.0.0.0:8080 0.0.0.0:* users:((\"x\",fd=1))"),
            Err(Error::Parse {
                reason: "missing pid",
                ..
            })
        ));
    }

    #[test]
    fn loopback_detection() {
        for addr in ["127.0.0.1:9100", "127.0.0.53%lo:53", "[::1]:631", "[::ffff:127.0.0.1]:80"] {
            assert!(is_loopback(addr), "{addr}");
        }
        for addr in ["0.0.0.0:22", "*:22", "[::]:22", "10.0.0.5:4789", "[fe80::1%eth0]:546"] {
            assert!(!is_loopback(addr), "{addr}");
        }
    }
}
