//! Download directory and collision-safe file naming.
//!
//! An incoming `report.pdf` lands as `report.pdf`, then `report(c1).pdf`,
//! `report(c2).pdf`, … The destination is opened with create-if-absent,
//! so two transfers can never claim the same path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::error::{LanboxError, Result};

/// Directory name used when none is configured.
pub const DEFAULT_DOWNLOAD_DIR: &str = "Downloads";

/// Reduce a sender-supplied name to its final path component.
///
/// Returns `None` when nothing usable remains (`""`, `.`, `..`, `a/`).
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next()?;
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// The `n`-th collision candidate for `name`: `stem(cN).ext`.
///
/// `n == 0` yields `name` unchanged.
pub fn collision_candidate(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}(c{n}).{}", ext.to_string_lossy()),
        None => format!("{stem}(c{n})"),
    }
}

/// The fixed root under which every received file is written.
#[derive(Debug, Clone)]
pub struct DownloadDir {
    root: PathBuf,
}

impl DownloadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| LanboxError::storage(&self.root, e))
    }

    /// Create a new, empty file for `raw_name`, probing collision
    /// suffixes until an unused path is found.
    pub async fn create_unique(&self, raw_name: &str) -> Result<(PathBuf, File)> {
        let name = sanitize_filename(raw_name)
            .ok_or_else(|| LanboxError::protocol(format!("unusable filename {raw_name:?}")))?;
        self.ensure().await?;

        let mut n = 0u32;
        loop {
            let path = self.root.join(collision_candidate(&name, n));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    n = n.checked_add(1).ok_or_else(|| {
                        LanboxError::protocol(format!("no free name for {name:?}"))
                    })?;
                }
                Err(e) => return Err(LanboxError::storage(path, e)),
            }
        }
    }
}

impl Default for DownloadDir {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_DIR)
    }
}
