use crate::Node;
use commatrix_core::Catalog;
use kube::ResourceExt;

/// Returns the node's reported roles, sorted and joined with commas (e.g. `master,worker`).
///
/// Roles are read from label keys carrying the catalog's role prefix; roles the catalog does not
/// report are ignored. A node without any reported role yields an empty string.
pub fn node_roles(node: &Node, catalog: &Catalog) -> String {
    // Labels are a BTreeMap, so roles come out sorted.
    node.labels()
        .keys()
        .filter_map(|key| catalog.role_from_label(key))
        .collect::<Vec<_>>()
        .join(",")
}
