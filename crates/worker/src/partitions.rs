//! Versioned partition names.
//!
//! Every deployment owns exactly three partitions, named
//! `{base}-static`, `{base}-dynamic` and `{base}-images`, where the base
//! embeds the version. Activation deletes everything else.

use std::fmt;

/// The three partitions a deployment owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Application shell and the install manifest.
    Static,
    /// API responses.
    Dynamic,
    /// Photos and media.
    Images,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 3] = [PartitionKind::Static, PartitionKind::Dynamic, PartitionKind::Images];

    fn suffix(self) -> &'static str {
        match self {
            PartitionKind::Static => "static",
            PartitionKind::Dynamic => "dynamic",
            PartitionKind::Images => "images",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Names of one deployment's partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    base: String,
}

impl PartitionNames {
    /// `base` is the versioned base name, e.g. `boxer-site-v1.0.0`.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn name(&self, kind: PartitionKind) -> String {
        format!("{}-{}", self.base, kind.suffix())
    }

    pub fn all(&self) -> Vec<String> {
        PartitionKind::ALL.iter().map(|kind| self.name(*kind)).collect()
    }

    /// Whether a partition belongs to this deployment.
    pub fn is_current(&self, name: &str) -> bool {
        PartitionKind::ALL.iter().any(|kind| self.name(*kind) == name)
    }
}
