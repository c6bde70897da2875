use crate::{
    entries, snapshot, static_entries, DebugPods, Deployment, Environment, Format, Report,
};
use anyhow::{Context, Result};
use clap::Parser;
use commatrix_core::{Catalog, Matrix, Source};
use commatrix_scan::{scan_nodes, Backoff, ScanConfig};
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

const DEFAULT_DEBUG_IMAGE: &str = "registry.redhat.io/rhel9/support-tools:latest";

#[derive(Debug, Parser)]
#[clap(
    name = "commatrix",
    version,
    about = "Builds a cluster's node communication matrix and checks it against live sockets"
)]
pub struct Args {
    #[clap(long, default_value = "commatrix=info,warn", env = "COMMATRIX_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// Directory the matrices, the diff and the raw socket tables are written to.
    #[clap(long, default_value = "communication-matrix")]
    dest_dir: PathBuf,

    /// Output format: csv, json, yaml or nft.
    #[clap(long, default_value = "csv")]
    format: Format,

    /// JSON or YAML list of entries to add to the declared matrix.
    #[clap(long)]
    custom_entries: Option<PathBuf>,

    /// Cluster infrastructure selecting the bundled always-present entries: baremetal or aws.
    #[clap(long, default_value = "baremetal")]
    env: Environment,

    /// Cluster shape selecting the bundled always-present entries: mno or sno.
    #[clap(long, default_value = "mno")]
    deployment: Deployment,

    /// JSON or YAML list of always-present entries used instead of the bundled ones.
    #[clap(long)]
    static_entries: Option<PathBuf>,

    /// YAML file overriding the host-level services, optional services and node roles.
    #[clap(long)]
    catalog: Option<PathBuf>,

    #[clap(long, default_value = "openshift-commatrix-debug")]
    debug_namespace: String,

    #[clap(long, default_value = DEFAULT_DEBUG_IMAGE)]
    debug_image: String,

    /// Delay between attempts of a failing remote command.
    #[clap(long, default_value = "500")]
    exec_interval_ms: u64,

    /// Time after which a failing remote command is given up on.
    #[clap(long, default_value = "5")]
    exec_timeout_secs: u64,

    #[clap(long, default_value = "16")]
    max_concurrent_scans: NonZeroUsize,

    /// Also write each node's raw socket tables.
    #[clap(long)]
    raw: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            dest_dir,
            format,
            custom_entries,
            env,
            deployment,
            static_entries,
            catalog,
            debug_namespace,
            debug_image,
            exec_interval_ms,
            exec_timeout_secs,
            max_concurrent_scans,
            raw,
        } = self;

        log_format
            .try_init(log_level)
            .context("failed to configure logging")?;

        let catalog = match catalog {
            Some(path) => entries::load_catalog(&path)?,
            None => Catalog::default(),
        };
        let custom = match custom_entries {
            Some(path) => entries::load_entries(&path, Source::Custom)?,
            None => Vec::new(),
        };
        let statics = match static_entries {
            Some(path) => entries::load_entries(&path, Source::Static)?,
            None => static_entries::static_entries(env, deployment)?,
        };
        let config = ScanConfig {
            backoff: Backoff {
                interval: Duration::from_millis(exec_interval_ms),
                timeout: Duration::from_secs(exec_timeout_secs),
            },
            max_concurrent: max_concurrent_scans,
        };

        let client = client
            .try_client()
            .await
            .context("failed to initialize cluster client")?;
        let snapshot = snapshot::load(&client).await?;

        let declared = commatrix_k8s_declared::resolve(&snapshot, &catalog)?;
        let declared = Matrix::build([declared.into_entries(), custom, statics]);
        info!(entries = declared.len(), "Built declared matrix");

        let debug_pods = Arc::new(DebugPods::new(client, debug_namespace, debug_image));
        debug_pods.create_namespace().await?;
        let scans = scan_nodes(
            &snapshot.nodes,
            debug_pods.clone(),
            Arc::new(catalog),
            &config,
        )
        .await;
        if let Err(error) = debug_pods.delete_namespace().await {
            warn!(%error, "Failed to clean up debug namespace");
        }
        let report = Report::new(declared, scans?);
        info!(entries = report.observed.len(), "Built observed matrix");

        report.write(&dest_dir, format, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["commatrix"]).expect("must parse");
        assert_eq!(args.dest_dir, PathBuf::from("communication-matrix"));
        assert_eq!(args.format, Format::Csv);
        assert_eq!(args.debug_namespace, "openshift-commatrix-debug");
        assert_eq!(args.exec_interval_ms, 500);
        assert_eq!(args.exec_timeout_secs, 5);
        assert_eq!(args.max_concurrent_scans.get(), 16);
        assert!(!args.raw);
        assert!(args.custom_entries.is_none());
        assert_eq!(args.env, Environment::Baremetal);
        assert_eq!(args.deployment, Deployment::Mno);
        assert!(args.static_entries.is_none());
    }

    #[test]
    fn parses_flags() {
        let args = Args::try_parse_from([
            "commatrix",
            "--format",
            "nft",
            "--dest-dir",
            "/tmp/out",
            "--custom-entries",
            "custom.yaml",
            "--max-concurrent-scans",
            "4",
            "--raw",
            "--env",
            "aws",
            "--deployment",
            "sno",
        ])
        .expect("must parse");
        assert_eq!(args.format, Format::Nft);
        assert_eq!(args.dest_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.custom_entries, Some(PathBuf::from("custom.yaml")));
        assert_eq!(args.max_concurrent_scans.get(), 4);
        assert!(args.raw);
        assert_eq!(args.env, Environment::Aws);
        assert_eq!(args.deployment, Deployment::Sno);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Args::try_parse_from(["commatrix", "--format", "xml"]).is_err());
        assert!(Args::try_parse_from(["commatrix", "--env", "gcp"]).is_err());
        assert!(Args::try_parse_from(["commatrix", "--deployment", "big"]).is_err());
        assert!(Args::try_parse_from(["commatrix", "--max-concurrent-scans", "0"]).is_err());
    }
}
