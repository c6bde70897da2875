use crate::{Entry, FullKey};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// A deduplicated, unordered collection of [`Entry`] values.
///
/// No two entries in a matrix share a full identity. Every constructor deduplicates, so the
/// invariant holds for any matrix handed out by this type; callers that need a stable order use
/// [`Matrix::sorted`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Matrix(Vec<Entry>);

// === impl Matrix ===

impl Matrix {
    /// Builds a matrix from any number of entry lists.
    ///
    /// When several entries share a full identity, the first one seen is kept. Construction never
    /// fails.
    pub fn build<I, L>(lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Entry>,
    {
        lists.into_iter().flatten().collect()
    }

    /// Merges matrices into one.
    pub fn merge(matrices: impl IntoIterator<Item = Matrix>) -> Self {
        Self::build(matrices.into_iter().map(|Matrix(entries)| entries))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.0.iter()
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.0.contains(entry)
    }

    /// Returns the entries ordered by role, protocol and port, then by the remaining fields.
    pub fn sorted(&self) -> Vec<&Entry> {
        let mut entries = self.0.iter().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.full_key().cmp(&b.full_key()));
        entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.0
    }

    fn dedup(mut entries: Vec<Entry>) -> Vec<Entry> {
        let keep = {
            let mut seen = AHashSet::<FullKey<'_>>::with_capacity(entries.len());
            entries
                .iter()
                .map(|e| seen.insert(e.full_key()))
                .collect::<Vec<_>>()
        };

        let before = entries.len();
        let mut keep = keep.into_iter();
        entries.retain(|_| keep.next().unwrap_or(false));
        if entries.len() < before {
            tracing::trace!(dropped = before - entries.len(), "Removed duplicate entries");
        }
        entries
    }
}

impl FromIterator<Entry> for Matrix {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        Self(Self::dedup(iter.into_iter().collect()))
    }
}

impl From<Vec<Entry>> for Matrix {
    fn from(entries: Vec<Entry>) -> Self {
        Self(Self::dedup(entries))
    }
}

impl IntoIterator for Matrix {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'m> IntoIterator for &'m Matrix {
    type Item = &'m Entry;
    type IntoIter = std::slice::Iter<'m, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        Vec::<Entry>::deserialize(de).map(Self::from)
    }
}
