//! Cluster-facing glue for the communication matrix: command-line arguments, cluster snapshots,
//! debug pods that run commands on nodes, entry files, the bundled always-present entries and
//! report output.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod args;
mod debug_pod;
mod entries;
mod format;
mod report;
pub mod snapshot;
mod static_entries;

pub use self::{
    args::Args,
    debug_pod::{DebugPod, DebugPods},
    entries::{load_catalog, load_entries, parse_entries},
    format::{Format, InvalidFormat},
    report::Report,
    static_entries::{
        static_entries, Deployment, Environment, InvalidDeployment, InvalidEnvironment,
    },
};
