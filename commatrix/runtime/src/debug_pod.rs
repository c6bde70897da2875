//! Privileged per-node execution contexts.
//!
//! Each scanned node gets a short-lived pod that shares the node's network and PID namespaces and
//! mounts the node's root filesystem at `/host`. Commands run through the pods/exec subresource
//! under `chroot /host`, so they see the node exactly as a local shell would.

use anyhow::{bail, Context, Result};
use commatrix_k8s_api::{
    api::core::v1::{
        Container, HostPathVolumeSource, PodSpec, SecurityContext, Toleration, Volume, VolumeMount,
    },
    labels, Namespace, ObjectMeta, Pod, ResourceExt,
};
use commatrix_scan::{retry, Backoff, Connect, Execute};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::{
    api::{Api, AttachParams, DeleteParams, PostParams},
    runtime::wait::{await_condition, conditions},
    Client,
};
use maplit::{btreemap, convert_args};
use tokio::{io::AsyncReadExt, time};
use tracing::{debug, info, instrument, warn};

const CONTAINER: &str = "debug";
const FIELD_MANAGER: &str = "commatrix";
const HOST_MOUNT: &str = "/host";
const NODE_LABEL: &str = "commatrix.openshift.io/node";
const READY_TIMEOUT: time::Duration = time::Duration::from_secs(120);

/// Creates debug pods in a dedicated namespace.
#[derive(Clone)]
pub struct DebugPods {
    client: Client,
    namespace: String,
    image: String,
}

/// A running debug pod pinned to one node.
pub struct DebugPod {
    api: Api<Pod>,
    name: String,
    node: String,
}

// === impl DebugPods ===

impl DebugPods {
    pub fn new(client: Client, namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
        }
    }

    /// Creates the namespace that holds the debug pods. An existing namespace is reused.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn create_namespace(&self) -> Result<()> {
        let api = Api::<Namespace>::all(self.client.clone());
        match api.create(&post_params(), &self.namespace_object()).await {
            Ok(_) => {
                info!("Created debug namespace");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                debug!("Debug namespace already exists");
                Ok(())
            }
            Err(error) => Err(error).context("failed to create debug namespace"),
        }
    }

    /// Deletes the debug namespace along with anything left in it.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn delete_namespace(&self) -> Result<()> {
        Api::<Namespace>::all(self.client.clone())
            .delete(&self.namespace, &DeleteParams::background())
            .await
            .context("failed to delete debug namespace")?;
        info!("Deleted debug namespace");
        Ok(())
    }

    fn namespace_object(&self) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                labels: Some(convert_args!(btreemap!(
                    labels::MANAGED_BY => labels::MANAGED_BY_VALUE,
                    "pod-security.kubernetes.io/enforce" => "privileged",
                    "pod-security.kubernetes.io/audit" => "privileged",
                    "pod-security.kubernetes.io/warn" => "privileged",
                    "security.openshift.io/scc.podSecurityLabelSync" => "false",
                ))),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod(&self, node: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                generate_name: Some("commatrix-debug-".to_string()),
                namespace: Some(self.namespace.clone()),
                labels: Some(convert_args!(btreemap!(
                    labels::MANAGED_BY => labels::MANAGED_BY_VALUE,
                    NODE_LABEL => node,
                ))),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.to_string()),
                host_network: Some(true),
                host_pid: Some(true),
                restart_policy: Some("Never".to_string()),
                termination_grace_period_seconds: Some(0),
                tolerations: Some(vec![Toleration {
                    operator: Some("Exists".to_string()),
                    ..Default::default()
                }]),
                containers: vec![Container {
                    name: CONTAINER.to_string(),
                    image: Some(self.image.clone()),
                    command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                    security_context: Some(SecurityContext {
                        privileged: Some(true),
                        run_as_user: Some(0),
                        ..Default::default()
                    }),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "host".to_string(),
                        mount_path: HOST_MOUNT.to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: "host".to_string(),
                    host_path: Some(HostPathVolumeSource {
                        path: "/".to_string(),
                        type_: Some("Directory".to_string()),
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl Connect for DebugPods {
    type Session = DebugPod;

    #[instrument(skip(self))]
    async fn connect(&self, node: &str) -> Result<DebugPod> {
        let api = Api::<Pod>::namespaced(self.client.clone(), &self.namespace);
        let pod = api
            .create(&post_params(), &self.pod(node))
            .await
            .context("failed to create debug pod")?;
        let session = DebugPod {
            api,
            name: pod.name_any(),
            node: node.to_string(),
        };
        debug!(pod = %session.name, "Created debug pod");

        let running = await_condition(
            session.api.clone(),
            &session.name,
            conditions::is_pod_running(),
        );
        let error = match time::timeout(READY_TIMEOUT, running).await {
            Ok(Ok(_)) => {
                debug!(pod = %session.name, "Debug pod is running");
                return Ok(session);
            }
            Ok(Err(error)) => anyhow::Error::new(error).context("failed to watch debug pod"),
            Err(_) => anyhow::anyhow!("debug pod did not start within {READY_TIMEOUT:?}"),
        };

        if let Err(cleanup) = self.release(session).await {
            warn!(error = %cleanup, "Failed to delete debug pod");
        }
        Err(error)
    }

    async fn release(&self, session: DebugPod) -> Result<()> {
        session
            .api
            .delete(&session.name, &DeleteParams::background().grace_period(0))
            .await
            .with_context(|| format!("failed to delete debug pod {}", session.name))?;
        debug!(node = %session.node, pod = %session.name, "Deleted debug pod");
        Ok(())
    }
}

// === impl DebugPod ===

#[async_trait::async_trait]
impl Execute for DebugPod {
    async fn execute(&self, command: &str, backoff: &Backoff) -> Result<Vec<u8>> {
        retry(backoff, command, move || self.exec(command)).await
    }
}

impl DebugPod {
    #[instrument(skip(self), fields(node = %self.node, pod = %self.name))]
    async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        let params = AttachParams::default()
            .container(CONTAINER)
            .stdout(true)
            .stderr(true);
        let mut process = self
            .api
            .exec(&self.name, ["chroot", HOST_MOUNT, "sh", "-c", command], &params)
            .await
            .context("failed to start command")?;

        let mut stdout = process.stdout().context("command has no stdout")?;
        let mut stderr = process.stderr().context("command has no stderr")?;
        let status = process.take_status().context("command has no status")?;

        let (mut out, mut err) = (Vec::new(), Vec::new());
        tokio::try_join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err))
            .context("failed to read command output")?;
        let status = status.await;
        process.join().await.context("command stream failed")?;

        match status {
            None => Ok(out),
            Some(Status {
                status: Some(ref s),
                ..
            }) if s == "Success" => Ok(out),
            Some(Status { message, .. }) => bail!(
                "{}: {}",
                message.unwrap_or_else(|| "command failed".to_string()),
                String::from_utf8_lossy(&err).trim()
            ),
        }
    }
}

fn post_params() -> PostParams {
    PostParams {
        dry_run: false,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}
