//! Communication matrix model.
//!
//! A communication matrix is the set of ingress listeners that a cluster's nodes expose, keyed by
//! node role, protocol and port. Entries come from two places: the cluster's declared objects
//! (endpoint slices backed by host-network pods) and the live socket tables of each node. This
//! crate holds the pieces that have no I/O:
//!
//! - [`Entry`], one listener fact, with its two notions of identity;
//! - [`Matrix`], a deduplicated collection of entries;
//! - [`Diff`], the comparison of two matrices by role/protocol/port;
//! - [`Catalog`], the service and role tables the resolvers consult;
//! - [`Error`], the failures every stage reports.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod catalog;
mod diff;
mod entry;
mod error;
mod matrix;

pub use self::{
    catalog::Catalog,
    diff::Diff,
    entry::{Direction, Entry, FullKey, InvalidProtocol, NarrowKey, Protocol, Source},
    error::{Error, Result},
    matrix::Matrix,
};
