use anyhow::{Context, Result};
use commatrix_core::{Entry, Matrix, Protocol};
use std::{collections::BTreeSet, fmt, fmt::Write, num::NonZeroU16, str::FromStr};

/// How a matrix is rendered to disk.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Csv,
    Json,
    Yaml,
    /// An nftables ruleset that accepts exactly the matrix's ports.
    Nft,
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported format {0:?}: expected one of csv, json, yaml, nft")]
pub struct InvalidFormat(String);

const CSV_HEADER: &str = "Direction,Protocol,Port,Namespace,Service,Pod,Container,Node Role,Required";

// === impl Format ===

impl Format {
    /// The file extension used for matrices in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Nft => "nft",
        }
    }

    /// Renders the matrix's entries, sorted.
    pub fn render(&self, matrix: &Matrix) -> Result<Vec<u8>> {
        let entries = matrix.sorted();
        let out = match self {
            Self::Csv => csv(&entries).into_bytes(),
            Self::Json => {
                let mut out =
                    serde_json::to_vec_pretty(&entries).context("failed to render JSON")?;
                out.push(b'\n');
                out
            }
            Self::Yaml => serde_yaml::to_string(&entries)
                .context("failed to render YAML")?
                .into_bytes(),
            Self::Nft => nftables(&entries).into_bytes(),
        };
        Ok(out)
    }
}

impl FromStr for Format {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "nft" | "nftables" => Ok(Self::Nft),
            _ => Err(InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn csv(entries: &[&Entry]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 64 * entries.len());
    out.push_str(CSV_HEADER);
    out.push('\n');
    for e in entries {
        // Writing to a `String` never fails.
        let _ = writeln!(out, "{e}");
    }
    out
}

fn nftables(entries: &[&Entry]) -> String {
    let ports = |protocol: Protocol| {
        entries
            .iter()
            .filter(|e| e.protocol == protocol)
            .map(|e| e.port)
            .collect::<BTreeSet<NonZeroU16>>()
    };

    let mut out = String::from(
        "#!/usr/sbin/nft -f\n\
         \n\
         table inet commatrix_filter {\n\
         \x20   chain input {\n\
         \x20       type filter hook input priority 0; policy drop;\n\
         \n\
         \x20       iifname \"lo\" accept\n\
         \n\
         \x20       # SSH stays reachable regardless of the matrix\n\
         \x20       tcp dport 22 accept\n",
    );
    for (protocol, ports) in [
        (Protocol::Tcp, ports(Protocol::Tcp)),
        (Protocol::Udp, ports(Protocol::Udp)),
    ] {
        if ports.is_empty() {
            continue;
        }
        let list = ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let proto = protocol.as_str().to_ascii_lowercase();
        // Writing to a `String` never fails.
        let _ = writeln!(out, "        {proto} dport {{ {list} }} accept");
    }
    out.push_str("    }\n}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use commatrix_core::Source;

    fn port(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).unwrap()
    }

    fn matrix() -> Matrix {
        Matrix::from(vec![
            Entry::new(Protocol::Udp, port(4789), "worker", Source::Observed)
                .with_service("ovs-vswitchd"),
            Entry::new(Protocol::Tcp, port(10250), "master,worker", Source::Declared)
                .with_service("kubelet"),
            Entry::new(Protocol::Tcp, port(22), "worker", Source::Static)
                .with_service("sshd")
                .with_required(false),
        ])
    }

    #[test]
    fn parses_names() {
        assert_eq!("CSV".parse::<Format>().unwrap(), Format::Csv);
        assert_eq!("yml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("nft".parse::<Format>().unwrap(), Format::Nft);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn csv_quotes_multi_role_fields() {
        let out = String::from_utf8(Format::Csv.render(&matrix()).unwrap()).unwrap();
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "Ingress,TCP,10250,,kubelet,,,\"master,worker\",true"
        );
        assert_eq!(lines[2], "Ingress,TCP,22,,sshd,,,worker,false");
        assert_eq!(lines[3], "Ingress,UDP,4789,,ovs-vswitchd,,,worker,true");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn json_and_yaml_read_back() {
        let json = Format::Json.render(&matrix()).unwrap();
        let from_json = serde_json::from_slice::<Matrix>(&json).unwrap();
        assert_eq!(from_json.len(), 3);
        assert!(matrix().iter().all(|e| from_json.contains(e)));

        let yaml = Format::Yaml.render(&matrix()).unwrap();
        let from_yaml = serde_yaml::from_slice::<Matrix>(&yaml).unwrap();
        assert_eq!(from_yaml.len(), 3);
    }

    #[test]
    fn nftables_lists_ports_per_protocol() {
        let mut entries = matrix().into_entries();
        entries.push(Entry::new(Protocol::Tcp, port(10250), "worker", Source::Observed));
        let out = String::from_utf8(Format::Nft.render(&Matrix::from(entries)).unwrap()).unwrap();

        assert!(out.starts_with("#!/usr/sbin/nft -f\n"));
        assert!(out.contains("policy drop;"));
        assert!(out.contains("        tcp dport { 22, 10250 } accept\n"));
        assert!(out.contains("        udp dport { 4789 } accept\n"));
    }

    #[test]
    fn nftables_omits_empty_protocols() {
        let matrix = Matrix::from(vec![Entry::new(
            Protocol::Tcp,
            port(6443),
            "master",
            Source::Declared,
        )]);
        let out = String::from_utf8(Format::Nft.render(&matrix).unwrap()).unwrap();
        assert!(out.contains("tcp dport { 6443 } accept"));
        assert!(!out.contains("udp dport"));
    }
}
