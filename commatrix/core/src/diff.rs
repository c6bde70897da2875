use crate::{Entry, Matrix, NarrowKey};
use ahash::AHashSet;
use std::fmt;

/// The comparison of two matrices by role, protocol and port.
///
/// For `Diff::new(left, right)`:
///
/// - `common` holds the entries of `left` that `right` also has;
/// - `added` holds the entries of `left` that `right` lacks;
/// - `removed` holds the entries of `right` that `left` lacks.
///
/// Attribution (service, pod, container) is not compared, so a port that moved from one owning
/// service to another on the same role is reported as common.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub common: Vec<Entry>,
    pub added: Vec<Entry>,
    pub removed: Vec<Entry>,
}

impl Diff {
    pub fn new(left: &Matrix, right: &Matrix) -> Self {
        let left_keys = left.iter().map(Entry::narrow_key).collect::<AHashSet<_>>();
        let right_keys = right
            .iter()
            .map(Entry::narrow_key)
            .collect::<AHashSet<NarrowKey<'_>>>();

        let (common, added) = left
            .iter()
            .cloned()
            .partition(|e| right_keys.contains(&e.narrow_key()));
        let removed = right
            .iter()
            .filter(|e| !left_keys.contains(&e.narrow_key()))
            .cloned()
            .collect();

        Self {
            common,
            added,
            removed,
        }
    }

    /// True when both matrices expose exactly the same role/protocol/port facts.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Renders one line per entry: common entries unprefixed, then `+ ` for added and `- ` for removed.
impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut left = self
            .common
            .iter()
            .map(|e| (false, e))
            .chain(self.added.iter().map(|e| (true, e)))
            .collect::<Vec<_>>();
        left.sort_by(|(_, a), (_, b)| a.full_key().cmp(&b.full_key()));
        for (added, entry) in left {
            if added {
                writeln!(f, "+ {entry}")?;
            } else {
                writeln!(f, "{entry}")?;
            }
        }

        let mut removed = self.removed.iter().collect::<Vec<_>>();
        removed.sort_by(|a, b| a.full_key().cmp(&b.full_key()));
        for entry in removed {
            writeln!(f, "- {entry}")?;
        }
        Ok(())
    }
}
