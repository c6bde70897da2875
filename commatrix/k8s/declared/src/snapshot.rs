use commatrix_k8s_api::{EndpointSlice, Node, Pod, Service};

/// A point-in-time listing of the cluster objects the resolver reads.
///
/// The resolver never mutates a snapshot; it is built by the caller (usually from the cluster API)
/// and may be shared.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    pub endpoint_slices: Vec<EndpointSlice>,
}
