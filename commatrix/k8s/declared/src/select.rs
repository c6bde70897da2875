use crate::index::Index;
use commatrix_core::{Catalog, Entry, Error, Protocol, Result, Source};
use commatrix_k8s_api::{labels, node_roles, EndpointSlice, Pod, Service};
use std::{collections::BTreeSet, num::NonZeroU16};
use tracing::{debug, trace, warn};

/// An endpoint slice together with the service that owns it and the pods behind it.
#[derive(Debug)]
pub(crate) struct SliceInfo<'s> {
    slice: &'s EndpointSlice,
    namespace: &'s str,
    name: &'s str,
    service: &'s Service,
    pods: Vec<&'s Pod>,
}

/// Keeps or drops a bundled slice.
type Filter = fn(&SliceInfo<'_>) -> bool;

const INGRESS_FILTERS: &[Filter] = &[host_network, node_reachable_service];

const NODE_REACHABLE_SERVICE_TYPES: &[&str] = &["NodePort", "LoadBalancer"];

/// True if every ingress filter keeps the slice.
pub(crate) fn is_ingress(info: &SliceInfo<'_>) -> bool {
    INGRESS_FILTERS.iter().all(|f| f(info))
}

/// At least one backing pod shares the node's network namespace.
fn host_network(info: &SliceInfo<'_>) -> bool {
    let keep = info.pods.iter().any(|pod| {
        pod.spec
            .as_ref()
            .and_then(|spec| spec.host_network)
            .unwrap_or(false)
    });
    if !keep {
        trace!(slice = %info.name, "No host-network pods");
    }
    keep
}

/// The owning service is exposed on node ports.
fn node_reachable_service(info: &SliceInfo<'_>) -> bool {
    let type_ = info
        .service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .unwrap_or("ClusterIP");
    let keep = NODE_REACHABLE_SERVICE_TYPES.contains(&type_);
    if !keep {
        trace!(slice = %info.name, %type_, "Service is not node-reachable");
    }
    keep
}

// === impl SliceInfo ===

impl<'s> SliceInfo<'s> {
    /// Links a slice with its owning service and backing pods.
    ///
    /// Returns `None` when the slice names no owning service. A named service or a referenced
    /// pod that the snapshot lacks is a resolution error: dropping it could flip a filter and
    /// silently hide the slice's listeners. Endpoints without a target reference are skipped.
    pub fn bundle(slice: &'s EndpointSlice, index: &Index<'s>) -> Result<Option<Self>> {
        let namespace = slice.metadata.namespace.as_deref().unwrap_or_default();
        let name = slice.metadata.name.as_deref().unwrap_or_default();
        let referrer = || format!("endpointslice {namespace}/{name}");

        let owner = slice
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.kind == "Service")
            .map(|o| o.name.as_str())
            .or_else(|| {
                slice
                    .metadata
                    .labels
                    .as_ref()?
                    .get(labels::SERVICE_NAME)
                    .map(String::as_str)
            });
        let Some(owner) = owner else {
            debug!(%namespace, slice = %name, "No owning service");
            return Ok(None);
        };
        let service = index
            .service(namespace, owner)
            .ok_or_else(|| Error::Resolution {
                kind: "service",
                name: format!("{namespace}/{owner}"),
                referrer: referrer(),
            })?;

        let mut pods = Vec::with_capacity(slice.endpoints.len());
        for endpoint in &slice.endpoints {
            let Some(target) = endpoint.target_ref.as_ref() else {
                continue;
            };
            if target.kind.as_deref().is_some_and(|kind| kind != "Pod") {
                continue;
            }
            let Some(pod_name) = target.name.as_deref() else {
                continue;
            };
            let pod_ns = target.namespace.as_deref().unwrap_or(namespace);
            let pod = index
                .pod(pod_ns, pod_name)
                .ok_or_else(|| Error::Resolution {
                    kind: "pod",
                    name: format!("{pod_ns}/{pod_name}"),
                    referrer: referrer(),
                })?;
            pods.push(pod);
        }

        Ok(Some(Self {
            slice,
            namespace,
            name,
            service,
            pods,
        }))
    }

    /// Emits one entry per (role, declared port) pair.
    pub fn entries(&self, index: &Index<'s>, catalog: &Catalog) -> Result<Vec<Entry>> {
        let referrer = format!("endpointslice {}/{}", self.namespace, self.name);

        let mut roles = BTreeSet::new();
        for endpoint in &self.slice.endpoints {
            let node_name = endpoint.node_name.as_deref().ok_or_else(|| Error::Invalid {
                kind: "endpointslice",
                name: format!("{}/{}", self.namespace, self.name),
                reason: "endpoint does not name a node".to_string(),
            })?;
            let node = index.node(node_name).ok_or_else(|| Error::Resolution {
                kind: "node",
                name: node_name.to_string(),
                referrer: referrer.clone(),
            })?;
            roles.insert(node_roles(node, catalog));
        }

        let slice_labels = self.slice.metadata.labels.as_ref();
        let service = slice_labels
            .and_then(|l| l.get(labels::SERVICE_NAME))
            .cloned()
            .unwrap_or_default();
        let required = !slice_labels.is_some_and(|l| l.contains_key(labels::OPTIONAL));

        let mut entries = Vec::new();
        for port in self.slice.ports.iter().flatten() {
            let Some((protocol, number)) = self.port(port)? else {
                continue;
            };
            for role in &roles {
                let mut entry = Entry::new(protocol, number, role.clone(), Source::Declared)
                    .with_service(service.clone())
                    .with_required(required);
                entry.namespace = self.namespace.to_string();
                entries.push(entry);
            }
        }

        trace!(slice = %self.name, ?roles, entries = entries.len(), "Bundled");
        Ok(entries)
    }

    /// Reads a declared port. Protocols other than TCP and UDP are skipped.
    fn port(
        &self,
        port: &commatrix_k8s_api::EndpointPort,
    ) -> Result<Option<(Protocol, NonZeroU16)>> {
        let invalid = |reason: String| Error::Invalid {
            kind: "endpointslice",
            name: format!("{}/{}", self.namespace, self.name),
            reason,
        };

        let protocol = port.protocol.as_deref().unwrap_or("TCP");
        let protocol = match protocol.parse::<Protocol>() {
            Ok(p) => p,
            Err(error) => {
                warn!(slice = %self.name, %error, "Skipping port");
                return Ok(None);
            }
        };

        let number = port
            .port
            .ok_or_else(|| invalid("port number is not set".to_string()))?;
        let number = u16::try_from(number)
            .ok()
            .and_then(NonZeroU16::new)
            .ok_or_else(|| invalid(format!("port {number} is out of range")))?;

        Ok(Some((protocol, number)))
    }
}
