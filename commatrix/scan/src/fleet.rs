use crate::{node::scan_node, Backoff, Connect, NodeScan};
use commatrix_core::{Catalog, Error, Matrix, Result};
use commatrix_k8s_api::{node_roles, Node, ResourceExt};
use std::{num::NonZeroUsize, sync::Arc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Settings shared by every node scan.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// The retry budget for each remote command.
    pub backoff: Backoff,
    /// How many nodes are scanned at once.
    pub max_concurrent: NonZeroUsize,
}

const DEFAULT_MAX_CONCURRENT: NonZeroUsize = match NonZeroUsize::new(16) {
    Some(n) => n,
    None => panic!("concurrency limit must not be zero"),
};

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Scans every node in parallel and returns the per-node results, ordered by node name.
///
/// The first failing scan becomes the result: no further scans are started, scans already in
/// flight are allowed to finish (and release their execution contexts), and their results are
/// discarded.
#[instrument(skip_all, fields(nodes = nodes.len()))]
pub async fn scan_nodes<C>(
    nodes: &[Node],
    connector: Arc<C>,
    catalog: Arc<Catalog>,
    config: &ScanConfig,
) -> Result<Vec<NodeScan>>
where
    C: Connect + Send + Sync + 'static,
{
    let backoff = config.backoff;
    let spawn = |tasks: &mut JoinSet<Result<NodeScan>>, node: String, role: String| {
        let connector = connector.clone();
        let catalog = catalog.clone();
        tasks.spawn(async move {
            scan_node(&*connector, &node, &role, &catalog, &backoff).await
        });
    };

    let mut pending = nodes
        .iter()
        .map(|node| (node.name_any(), node_roles(node, &catalog)));
    let mut tasks = JoinSet::new();
    for (node, role) in pending.by_ref().take(config.max_concurrent.get()) {
        spawn(&mut tasks, node, role);
    }

    let mut scans = Vec::with_capacity(nodes.len());
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|error| {
            Err(Error::Task {
                node: "unknown".to_string(),
                reason: error.to_string(),
            })
        });

        match result {
            Ok(scan) if failure.is_none() => scans.push(scan),
            Ok(scan) => debug!(node = %scan.node, "Discarding scan after failure"),
            Err(error) if failure.is_none() => {
                warn!(
                    node = error.node().unwrap_or("unknown"),
                    %error,
                    in_flight = tasks.len(),
                    "Node scan failed; no further scans will start"
                );
                failure = Some(error);
            }
            Err(error) => debug!(%error, "Discarding failure after the first"),
        }

        if failure.is_none() {
            if let Some((node, role)) = pending.next() {
                spawn(&mut tasks, node, role);
            }
        }
    }

    if let Some(error) = failure {
        return Err(error);
    }
    scans.sort_by(|a, b| a.node.cmp(&b.node));
    info!(nodes = scans.len(), "Scanned nodes");
    Ok(scans)
}

/// Scans every node and builds the matrix of observed listeners.
pub async fn observed_matrix<C>(
    nodes: &[Node],
    connector: Arc<C>,
    catalog: Arc<Catalog>,
    config: &ScanConfig,
) -> Result<Matrix>
where
    C: Connect + Send + Sync + 'static,
{
    let scans = scan_nodes(nodes, connector, catalog, config).await?;
    Ok(Matrix::build(scans.into_iter().map(|scan| scan.entries)))
}
