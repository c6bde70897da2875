use crate::Snapshot;
use ahash::AHashMap as HashMap;
use commatrix_k8s_api::{Node, ObjectMeta, Pod, Service};

/// Name lookups over a [`Snapshot`].
///
/// Objects without a name cannot be referenced and are left out.
#[derive(Debug)]
pub(crate) struct Index<'s> {
    nodes: HashMap<&'s str, &'s Node>,
    pods: HashMap<ResourceRef<'s>, &'s Pod>,
    services: HashMap<ResourceRef<'s>, &'s Service>,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct ResourceRef<'s> {
    pub namespace: &'s str,
    pub name: &'s str,
}

// === impl Index ===

impl<'s> Index<'s> {
    pub fn new(snapshot: &'s Snapshot) -> Self {
        let nodes = snapshot
            .nodes
            .iter()
            .filter_map(|n| Some((n.metadata.name.as_deref()?, n)))
            .collect();
        let pods = snapshot
            .pods
            .iter()
            .filter_map(|p| Some((ResourceRef::from_meta(&p.metadata)?, p)))
            .collect();
        let services = snapshot
            .services
            .iter()
            .filter_map(|s| Some((ResourceRef::from_meta(&s.metadata)?, s)))
            .collect();
        Self {
            nodes,
            pods,
            services,
        }
    }

    pub fn node(&self, name: &str) -> Option<&'s Node> {
        self.nodes.get(name).copied()
    }

    pub fn pod(&self, namespace: &'s str, name: &'s str) -> Option<&'s Pod> {
        self.pods.get(&ResourceRef { namespace, name }).copied()
    }

    pub fn service(&self, namespace: &'s str, name: &'s str) -> Option<&'s Service> {
        self.services.get(&ResourceRef { namespace, name }).copied()
    }
}

// === impl ResourceRef ===

impl<'s> ResourceRef<'s> {
    fn from_meta(meta: &'s ObjectMeta) -> Option<Self> {
        Some(Self {
            namespace: meta.namespace.as_deref().unwrap_or_default(),
            name: meta.name.as_deref()?,
        })
    }
}
