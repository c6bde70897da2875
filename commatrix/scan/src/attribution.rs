use crate::{Backoff, Execute};
use commatrix_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

static CRIO_SCOPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"crio-([0-9a-fA-F]+)\.scope").expect("cgroup pattern must compile")
});

/// The container that owns a listening socket, as recorded by the container runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub pod: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
struct ContainerList {
    #[serde(default)]
    containers: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    labels: ContainerLabels,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerLabels {
    #[serde(rename = "io.kubernetes.container.name", default)]
    container: String,
    #[serde(rename = "io.kubernetes.pod.name", default)]
    pod: String,
    #[serde(rename = "io.kubernetes.pod.namespace", default)]
    namespace: String,
}

/// Resolves the container that runs `pid` on `node`.
///
/// The process's cgroup membership names the CRI-O scope of its container; the runtime then
/// describes exactly that container.
#[instrument(skip(session, backoff))]
pub async fn container_of<E>(
    session: &E,
    node: &str,
    pid: u32,
    backoff: &Backoff,
) -> Result<Container>
where
    E: Execute + Sync + ?Sized,
{
    let id = container_id(session, node, pid, backoff).await?;
    debug!(%id, "Found container scope");

    let command = format!("crictl ps -o json --id {id}");
    let out = exec(session, node, &command, backoff).await?;
    let list = serde_json::from_slice::<ContainerList>(&out).map_err(|e| Error::Attribution {
        node: node.to_string(),
        pid,
        reason: format!("invalid container runtime output: {e}"),
    })?;

    let mut containers = list.containers.into_iter();
    match (containers.next(), containers.next()) {
        (Some(status), None) => {
            let ContainerLabels {
                container,
                pod,
                namespace,
            } = status.labels;
            Ok(Container {
                name: container,
                pod,
                namespace,
            })
        }
        (first, _) => {
            let n = first.map_or(0, |_| 2 + containers.count());
            Err(Error::Attribution {
                node: node.to_string(),
                pid,
                reason: format!("runtime returned {n} containers for id {id}, expected 1"),
            })
        }
    }
}

async fn container_id<E>(session: &E, node: &str, pid: u32, backoff: &Backoff) -> Result<String>
where
    E: Execute + Sync + ?Sized,
{
    let command = format!("cat /proc/{pid}/cgroup");
    let out = exec(session, node, &command, backoff).await?;
    let cgroup = String::from_utf8_lossy(&out);
    CRIO_SCOPE
        .captures(&cgroup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::Attribution {
            node: node.to_string(),
            pid,
            reason: "no container scope in cgroup membership".to_string(),
        })
}

pub(crate) async fn exec<E>(
    session: &E,
    node: &str,
    command: &str,
    backoff: &Backoff,
) -> Result<Vec<u8>>
where
    E: Execute + Sync + ?Sized,
{
    session
        .execute(command, backoff)
        .await
        .map_err(|source| Error::Scan {
            node: node.to_string(),
            command: command.to_string(),
            source,
        })
}
