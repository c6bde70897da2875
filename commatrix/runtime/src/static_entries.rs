//! Listeners every cluster exposes whether or not an endpoint slice declares them, such as sshd,
//! the kubelet and the node-level health endpoints.

use crate::entries;
use anyhow::Result;
use commatrix_core::{Entry, Source};
use std::{fmt, str::FromStr};
use tracing::debug;

const GENERAL_MASTER: &str = include_str!("../static/general-master.yaml");
const GENERAL_WORKER: &str = include_str!("../static/general-worker.yaml");
const BAREMETAL_MASTER: &str = include_str!("../static/baremetal-master.yaml");
const BAREMETAL_WORKER: &str = include_str!("../static/baremetal-worker.yaml");
const AWS_MASTER: &str = include_str!("../static/aws-master.yaml");
const AWS_WORKER: &str = include_str!("../static/aws-worker.yaml");
const MULTI_NODE: &str = include_str!("../static/mno.yaml");

/// The infrastructure a cluster runs on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Baremetal,
    Aws,
}

/// Whether the cluster has separate worker nodes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Deployment {
    /// Multi-node: control-plane and worker nodes.
    #[default]
    Mno,
    /// Single-node: one control-plane node and no workers.
    Sno,
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported environment {0:?}: expected baremetal or aws")]
pub struct InvalidEnvironment(String);

#[derive(Debug, thiserror::Error)]
#[error("unsupported deployment {0:?}: expected mno or sno")]
pub struct InvalidDeployment(String);

/// Returns the bundled always-present entries for `env` and `deployment`.
///
/// Every cluster gets the general control-plane entries and those of its environment. Multi-node
/// clusters also get the worker entries and the entries for traffic between nodes.
pub fn static_entries(env: Environment, deployment: Deployment) -> Result<Vec<Entry>> {
    let (env_master, env_worker) = match env {
        Environment::Baremetal => (BAREMETAL_MASTER, BAREMETAL_WORKER),
        Environment::Aws => (AWS_MASTER, AWS_WORKER),
    };

    let mut docs = vec![
        ("general-master", GENERAL_MASTER),
        (env.master_doc(), env_master),
    ];
    if deployment == Deployment::Mno {
        docs.extend([
            ("general-worker", GENERAL_WORKER),
            (env.worker_doc(), env_worker),
            ("mno", MULTI_NODE),
        ]);
    }

    let mut out = Vec::new();
    for (name, yaml) in docs {
        out.extend(entries::parse_entries(name, yaml, Source::Static)?);
    }
    debug!(%env, %deployment, entries = out.len(), "Selected static entries");
    Ok(out)
}

// === impl Environment ===

impl Environment {
    fn master_doc(&self) -> &'static str {
        match self {
            Self::Baremetal => "baremetal-master",
            Self::Aws => "aws-master",
        }
    }

    fn worker_doc(&self) -> &'static str {
        match self {
            Self::Baremetal => "baremetal-worker",
            Self::Aws => "aws-worker",
        }
    }
}

impl FromStr for Environment {
    type Err = InvalidEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baremetal" => Ok(Self::Baremetal),
            "aws" => Ok(Self::Aws),
            _ => Err(InvalidEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baremetal => f.write_str("baremetal"),
            Self::Aws => f.write_str("aws"),
        }
    }
}

// === impl Deployment ===

impl FromStr for Deployment {
    type Err = InvalidDeployment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mno" => Ok(Self::Mno),
            "sno" => Ok(Self::Sno),
            _ => Err(InvalidDeployment(s.to_string())),
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mno => f.write_str("mno"),
            Self::Sno => f.write_str("sno"),
        }
    }
}
