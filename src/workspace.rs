//! Workspace-relative target resolution.
//!
//! Callers may name a target by absolute path, by path relative to the
//! workspace root, or by a bare file name (or trailing path fragment) that is
//! searched for under the root.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::config::RemedyConfig;
use crate::error::{RemedyError, Result};

#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    root: PathBuf,
    skip_dirs: Vec<String>,
}

impl WorkspaceResolver {
    pub fn new(root: impl Into<PathBuf>, exclude_dirs: &[String], backup_dir: &str) -> Self {
        let mut skip_dirs = exclude_dirs.to_vec();
        skip_dirs.push(backup_dir.to_string());
        Self {
            root: root.into(),
            skip_dirs,
        }
    }

    pub fn from_config(cfg: &RemedyConfig) -> Self {
        Self::new(cfg.workspace.clone(), &cfg.exclude_dirs, &cfg.backup_dir)
    }

    /// Canonical workspace root.
    pub fn root(&self) -> Result<PathBuf> {
        self.root
            .canonicalize()
            .map_err(|e| RemedyError::io(&self.root, e))
    }

    /// Resolve `target` to an existing absolute path inside the workspace.
    pub fn resolve(&self, target: &str) -> Result<PathBuf> {
        let root = self.root()?;
        let requested = Path::new(target);
        if has_traversal(requested) {
            return Err(RemedyError::OutsideWorkspace {
                path: requested.to_path_buf(),
                workspace: root,
            });
        }

        let direct = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            root.join(requested)
        };
        if direct.exists() {
            let canonical = direct.canonicalize().map_err(|e| RemedyError::io(&direct, e))?;
            if !canonical.starts_with(&root) {
                return Err(RemedyError::OutsideWorkspace {
                    path: canonical,
                    workspace: root,
                });
            }
            return Ok(canonical);
        }
        if requested.is_absolute() {
            return Err(RemedyError::NotFound(direct));
        }

        let mut matches = self.search(&root, requested);
        match matches.len() {
            0 => Err(RemedyError::NotFound(requested.to_path_buf())),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                Err(RemedyError::Ambiguous {
                    name: target.to_string(),
                    matches,
                })
            }
        }
    }

    /// Files under `root` whose path ends with `fragment`, skipping excluded
    /// directories.
    fn search(&self, root: &Path, fragment: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self
                        .skip_dirs
                        .iter()
                        .any(|d| entry.file_name().to_string_lossy() == d.as_str())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!("skipping unreadable entry during search: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && entry.path().ends_with(fragment))
            .map(|entry| entry.into_path())
            .collect()
    }
}

/// Whether the path climbs out of its base via `..`.
fn has_traversal(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}
