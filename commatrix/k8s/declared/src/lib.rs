//! Declared listeners
//!
//! Derives the listeners a cluster *expects* its nodes to expose from a snapshot of its objects.
//! An endpoint slice describes node-reachable ingress traffic when both:
//!
//! - at least one of its backing pods runs in the host network namespace, and
//! - the service that owns it is of type `NodePort` or `LoadBalancer`.
//!
//! Every endpoint of a selected slice names the node it runs on; the node's role labels determine
//! which roles the slice's ports apply to. One entry is emitted per (role, port) pair.
//!
//! ```text
//! [ EndpointSlice ] -> [ Service ]   (type filter)
//!        |---------> [ Pod ]         (host-network filter)
//!        `---------> [ Node ]        (roles)
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod select;
mod snapshot;


pub use self::snapshot::Snapshot;
use self::{index::Index, select::SliceInfo};
use commatrix_core::{Catalog, Matrix, Result};
use tracing::{debug, instrument};

/// Resolves the snapshot's ingress endpoint slices into a deduplicated matrix.
///
/// Fails if any slice references a service or pod, or any selected slice references a node, that
/// the snapshot does not contain: an incomplete view would understate the listeners a node must
/// keep open.
#[instrument(skip_all, fields(slices = snapshot.endpoint_slices.len()))]
pub fn resolve(snapshot: &Snapshot, catalog: &Catalog) -> Result<Matrix> {
    let index = Index::new(snapshot);

    let mut entries = Vec::new();
    for slice in &snapshot.endpoint_slices {
        let Some(info) = SliceInfo::bundle(slice, &index)? else {
            continue;
        };
        if !select::is_ingress(&info) {
            continue;
        }
        entries.extend(info.entries(&index, catalog)?);
    }

    let matrix = Matrix::from(entries);
    debug!(entries = matrix.len(), "Resolved declared listeners");
    Ok(matrix)
}
