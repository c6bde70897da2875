use commatrix_core::{Error, Result};
use commatrix_k8s_api::{EndpointSlice, Node, Pod, Service};
use commatrix_k8s_declared::Snapshot;
use kube::{
    api::{Api, ListParams},
    Client, Resource,
};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, instrument};

/// Lists every node, pod, service and endpoint slice in the cluster.
#[instrument(skip_all)]
pub async fn load(client: &Client) -> Result<Snapshot> {
    let (nodes, pods, services, endpoint_slices) = tokio::try_join!(
        list::<Node>(client),
        list::<Pod>(client),
        list::<Service>(client),
        list::<EndpointSlice>(client),
    )?;
    debug!(
        nodes = nodes.len(),
        pods = pods.len(),
        services = services.len(),
        endpoint_slices = endpoint_slices.len(),
        "Loaded snapshot"
    );
    Ok(Snapshot {
        nodes,
        pods,
        services,
        endpoint_slices,
    })
}

async fn list<K>(client: &Client) -> Result<Vec<K>>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug,
    K::DynamicType: Default,
{
    let api = Api::<K>::all(client.clone());
    let list = api.list(&ListParams::default()).await.map_err(|error| {
        let plural = K::plural(&Default::default()).into_owned();
        Error::client(format!("failed to list {plural}"), error)
    })?;
    Ok(list.items)
}
