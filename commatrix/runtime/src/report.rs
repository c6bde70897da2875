use crate::Format;
use anyhow::{Context, Result};
use commatrix_core::{Diff, Matrix};
use commatrix_scan::NodeScan;
use std::{fmt::Write as _, fs, path::Path};
use tracing::info;

const DIFF_FILE: &str = "matrix-diff-ss";
const RAW_TCP_FILE: &str = "raw-ss-tcp";
const RAW_UDP_FILE: &str = "raw-ss-udp";

/// The outcome of one run: the declared matrix, what the nodes actually expose, and the raw
/// socket tables the latter was built from.
#[derive(Debug)]
pub struct Report {
    pub declared: Matrix,
    pub observed: Matrix,
    pub scans: Vec<NodeScan>,
}

// === impl Report ===

impl Report {
    pub fn new(declared: Matrix, scans: Vec<NodeScan>) -> Self {
        let observed = Matrix::build(scans.iter().map(|scan| scan.entries.clone()));
        Self {
            declared,
            observed,
            scans,
        }
    }

    /// Declared listeners not observed are `added`; observed listeners not declared are `removed`.
    pub fn diff(&self) -> Diff {
        Diff::new(&self.declared, &self.observed)
    }

    /// Writes the report into `dir`, creating it if needed:
    ///
    /// - `communication-matrix.<ext>`: the declared matrix;
    /// - `ss-generated-matrix.<ext>`: the observed matrix;
    /// - `matrix-diff-ss`: the diff between the two;
    /// - `raw-ss-tcp` and `raw-ss-udp`, when `raw` is set.
    pub fn write(&self, dir: &Path, format: Format, raw: bool) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let ext = format.extension();
        write_file(
            dir,
            &format!("communication-matrix.{ext}"),
            &format.render(&self.declared)?,
        )?;
        write_file(
            dir,
            &format!("ss-generated-matrix.{ext}"),
            &format.render(&self.observed)?,
        )?;

        let diff = self.diff();
        info!(
            common = diff.common.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Compared declared and observed matrices"
        );
        write_file(dir, DIFF_FILE, diff.to_string().as_bytes())?;

        if raw {
            write_file(dir, RAW_TCP_FILE, self.raw(|s| &s.raw_tcp).as_bytes())?;
            write_file(dir, RAW_UDP_FILE, self.raw(|s| &s.raw_udp).as_bytes())?;
        }
        Ok(())
    }

    /// Concatenates one socket table per node, each headed by the node's name.
    fn raw(&self, table: impl Fn(&NodeScan) -> &String) -> String {
        let mut out = String::new();
        for scan in &self.scans {
            let _ = writeln!(out, "node: {}", scan.node);
            out.push_str(table(scan));
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote");
    Ok(())
}
