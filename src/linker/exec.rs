//! Link plan execution with rollback
//!
//! Creation is atomic by intent: intermediate directories are created, then
//! every entry is linked; the first failure unlinks everything created so
//! far and removes the directories this run introduced. Pre-existing paths
//! are never touched by a rollback.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::CrossSeedError;

use super::{LinkMode, LinkPlan};

/// Execute a plan with the requested link primitive.
///
/// `Direct` mode has nothing to materialize and returns immediately.
pub fn execute_link_plan(plan: &LinkPlan, mode: LinkMode) -> Result<()> {
    if mode == LinkMode::Direct || plan.entries.is_empty() {
        return Ok(());
    }

    preflight(plan).map_err(|e| CrossSeedError::Filesystem(e.to_string()))?;

    let mut created_dirs: Vec<PathBuf> = Vec::new();
    let mut created_links: Vec<PathBuf> = Vec::new();

    let result = (|| -> io::Result<()> {
        for entry in &plan.entries {
            if let Some(parent) = entry.target.parent() {
                create_dirs_tracked(parent, &mut created_dirs)?;
            }
            match mode {
                LinkMode::Hardlink => fs::hard_link(&entry.source, &entry.target)?,
                LinkMode::Reflink => reflink_file(&entry.source, &entry.target)?,
                LinkMode::Direct => unreachable!("direct mode returns early"),
            }
            created_links.push(entry.target.clone());
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            debug!(
                links = created_links.len(),
                mode = %mode,
                root = %plan.root_dir.display(),
                "Link plan materialized"
            );
            Ok(())
        }
        Err(e) => {
            rollback(&created_links, &created_dirs);
            Err(CrossSeedError::Filesystem(format!(
                "{} link creation failed: {}",
                mode, e
            ))
            .into())
        }
    }
}

/// Verify sources exist with the planned sizes and share a filesystem with
/// the destination before touching anything
fn preflight(plan: &LinkPlan) -> Result<()> {
    let probe_target = nearest_existing_ancestor(&plan.root_dir);

    for entry in &plan.entries {
        let meta = fs::metadata(&entry.source)
            .with_context(|| format!("source missing: {}", entry.source.display()))?;
        if meta.len() as i64 != entry.size {
            anyhow::bail!(
                "size mismatch for {}: expected {}, found {}",
                entry.source.display(),
                entry.size,
                meta.len()
            );
        }
        if !same_filesystem(&entry.source, &probe_target)? {
            anyhow::bail!(
                "{} and {} are on different filesystems",
                entry.source.display(),
                plan.root_dir.display()
            );
        }
    }
    Ok(())
}

fn create_dirs_tracked(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut missing: Vec<PathBuf> = Vec::new();
    let mut cursor = dir;
    while !cursor.exists() {
        missing.push(cursor.to_path_buf());
        match cursor.parent() {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    // Parents first so rollback removes children first
    missing.reverse();
    created.extend(missing);
    Ok(())
}

fn rollback(links: &[PathBuf], dirs: &[PathBuf]) {
    for link in links.iter().rev() {
        if let Err(e) = fs::remove_file(link) {
            warn!(path = %link.display(), error = %e, "Rollback could not remove link");
        }
    }
    // Children before parents; only directories this run created
    for dir in dirs.iter().rev() {
        let _ = fs::remove_dir(dir);
    }
}

/// Whether two paths live on the same filesystem. A path that does not
/// exist yet is judged by its nearest existing ancestor.
#[cfg(unix)]
pub fn same_filesystem(a: &Path, b: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let dev_of = |path: &Path| -> Result<u64> {
        let probe = nearest_existing_ancestor(path);
        let meta = fs::metadata(&probe)
            .with_context(|| format!("cannot stat {}", probe.display()))?;
        Ok(meta.dev())
    };

    Ok(dev_of(a)? == dev_of(b)?)
}

#[cfg(not(unix))]
pub fn same_filesystem(a: &Path, b: &Path) -> Result<bool> {
    // Without device ids, compare path roots (drive letters)
    let root = |p: &Path| p.components().next().map(|c| c.as_os_str().to_owned());
    Ok(root(a) == root(b))
}

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    let mut cursor = path;
    loop {
        if cursor.exists() {
            return cursor.to_path_buf();
        }
        match cursor.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => cursor = parent,
            _ => return PathBuf::from("."),
        }
    }
}

/// Whether the filesystem holding `dir` supports copy-on-write clones.
///
/// Detected by attempting a 1-byte reflink between two probe files.
pub fn supports_reflink(dir: &Path) -> bool {
    let probe_src = dir.join(".seedcross-reflink-probe-src");
    let probe_dst = dir.join(".seedcross-reflink-probe-dst");

    let outcome = (|| -> io::Result<()> {
        fs::write(&probe_src, b"x")?;
        reflink_file(&probe_src, &probe_dst)
    })();

    let _ = fs::remove_file(&probe_src);
    let _ = fs::remove_file(&probe_dst);

    match outcome {
        Ok(()) => true,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Reflink probe failed");
            false
        }
    }
}

/// Copy-on-write clone of `source` at `target`
#[cfg(target_os = "linux")]
fn reflink_file(source: &Path, target: &Path) -> io::Result<()> {
    use std::fs::{File, OpenOptions};
    use std::os::fd::AsRawFd;

    let src = File::open(source)?;
    let dst = OpenOptions::new().write(true).create_new(true).open(target)?;

    let rc = unsafe {
        nix::libc::ioctl(
            dst.as_raw_fd(),
            nix::libc::FICLONE as nix::libc::c_ulong,
            src.as_raw_fd(),
        )
    };
    if rc != 0 {
        let err = io::Error::last_os_error();
        drop(dst);
        let _ = fs::remove_file(target);
        return Err(err);
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn reflink_file(_source: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "reflinks are only supported on Linux filesystems",
    ))
}
