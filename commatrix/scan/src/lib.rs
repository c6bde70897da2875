//! Observed listeners
//!
//! Scans the live socket tables of cluster nodes and attributes every listener to the service that
//! owns it. Each node is reached through a privileged execution context obtained from a
//! [`Connect`] implementation; the scan only needs to run commands in it:
//!
//! 1. `ss -anplt` and `ss -anplu` list TCP and UDP sockets with their owning processes;
//! 2. loopback sockets and sockets that are not listening are dropped;
//! 3. host-level services are named by their process;
//! 4. any other process is traced to its container through `/proc/<pid>/cgroup` and `crictl`.
//!
//! A line that cannot be parsed or attributed fails the node's scan, and a failed node scan fails
//! the whole build: an incomplete inventory is never returned.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod attribution;
mod exec;
mod fleet;
mod node;
mod ss;


pub use self::{
    attribution::Container,
    exec::{retry, Backoff, Connect, Execute},
    fleet::{observed_matrix, scan_nodes, ScanConfig},
    node::{scan_node, NodeScan},
};
