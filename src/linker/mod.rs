//! Link planning and execution
//!
//! Given a torrent's file list and the matched files already on disk,
//! produce a concrete plan of (source, target) pairs under a destination
//! directory, then materialize it with hardlinks or reflinks. A plan either
//! fully materializes or is rolled back; a partially linked destination is
//! never left behind.

pub mod exec;
pub mod plan;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use exec::{execute_link_plan, same_filesystem, supports_reflink};
pub use plan::{ExistingFile, LinkDirPreset, LinkPlanRequest, build_link_destination, build_link_plan};

/// How existing bytes are reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Second directory entry for the same inode; same filesystem required
    Hardlink,
    /// Copy-on-write clone; same filesystem plus reflink support required
    Reflink,
    /// No materialization; the client attaches at the existing save path
    Direct,
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkMode::Hardlink => write!(f, "hardlink"),
            LinkMode::Reflink => write!(f, "reflink"),
            LinkMode::Direct => write!(f, "direct"),
        }
    }
}

/// One link to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPlanEntry {
    /// Absolute path of the existing file
    pub source: PathBuf,
    /// Absolute path the link will be created at
    pub target: PathBuf,
    pub size: i64,
}

/// Fully resolved plan: either every target ends up present and sized, or
/// none do
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPlan {
    /// Directory the client will be pointed at as save path
    pub root_dir: PathBuf,
    /// Ordered link entries
    pub entries: Vec<LinkPlanEntry>,
    /// Torrent files with no on-disk counterpart; all of them matched an
    /// ignore pattern or the plan would have failed
    pub download_files: Vec<String>,
}

impl LinkPlan {
    /// Total bytes the links will expose
    pub fn linked_bytes(&self) -> i64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}
