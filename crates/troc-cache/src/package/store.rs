//! On-disk package documents and tarballs
//!
//! Layout under a registry's storage directory:
//!
//! ```text
//! packages/<scope>/<name>/info.json
//! packages/<scope>/<name>/-/<name>-<version>.tgz
//! ```
//!
//! Unscoped packages drop the `<scope>` level.

use std::sync::atomic::{AtomicU64, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use troc_core::error::TrocError;
use troc_core::utils::{is_safe_segment, safe_join};

use super::document::tarball_file_name;
use crate::CacheResult;

/// Directory holding every package below the storage root
pub const PACKAGES_DIR: &str = "packages";
/// Package document file name
pub const INFO_FILE: &str = "info.json";

/// Filesystem locations for one package (and optionally one version)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgPath {
    /// `packages/<scope>/<name>`
    pub dir: Utf8PathBuf,
    /// `.../info.json`
    pub info: Utf8PathBuf,
    /// `.../-/<name>-<version>.tgz` when a version was given
    pub tarball: Option<Utf8PathBuf>,
}

impl PkgPath {
    /// Compute paths for a package. Fails when any segment could escape
    /// the storage directory.
    pub fn new(base_dir: &Utf8Path, scope: Option<&str>, name: &str, version: Option<&str>) -> CacheResult<Self> {
        let mut relative = Utf8PathBuf::from(PACKAGES_DIR);
        if let Some(scope) = scope {
            relative.push(checked_segment(scope)?);
        }
        relative.push(checked_segment(name)?);

        let dir = safe_join(base_dir, &relative)?;
        let info = dir.join(INFO_FILE);
        let tarball = match version {
            Some(version) => {
                checked_segment(version)?;
                Some(dir.join("-").join(tarball_file_name(name, version)))
            }
            None => None,
        };

        Ok(Self { dir, info, tarball })
    }

    fn tarball_path(&self) -> CacheResult<&Utf8Path> {
        self.tarball
            .as_deref()
            .ok_or_else(|| TrocError::Validation("tarball path requires a version".to_string()))
    }
}

fn checked_segment(segment: &str) -> CacheResult<&str> {
    if is_safe_segment(segment) {
        Ok(segment)
    } else {
        Err(TrocError::Validation(format!("invalid package path segment '{}'", segment)))
    }
}

/// Package storage of one registry
#[derive(Debug, Clone)]
pub struct PackageStore {
    /// Registry storage directory
    base_dir: Utf8PathBuf,
}

impl PackageStore {
    pub fn new<P: AsRef<Utf8Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    pub fn path(&self, scope: Option<&str>, name: &str, version: Option<&str>) -> CacheResult<PkgPath> {
        PkgPath::new(&self.base_dir, scope, name, version)
    }

    /// Whether a package document exists
    pub async fn access_info(&self, scope: Option<&str>, name: &str) -> bool {
        match self.path(scope, name, None) {
            Ok(path) => exists(&path.info).await,
            Err(_) => false,
        }
    }

    /// Whether a tarball exists
    pub async fn access_tarball(&self, scope: Option<&str>, name: &str, version: &str) -> bool {
        match self.path(scope, name, Some(version)) {
            Ok(path) => match path.tarball {
                Some(tarball) => exists(&tarball).await,
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Raw bytes of a package document
    pub async fn read_info(&self, scope: Option<&str>, name: &str) -> CacheResult<Vec<u8>> {
        let path = self.path(scope, name, None)?;
        read(&path.info).await
    }

    /// Parsed package document, `None` when absent
    pub async fn read_info_json(&self, scope: Option<&str>, name: &str) -> CacheResult<Option<Value>> {
        if !self.access_info(scope, name).await {
            return Ok(None);
        }
        let bytes = self.read_info(scope, name).await?;
        let value = serde_json::from_slice(&bytes).map_err(|e| TrocError::json("Failed to parse info.json", e))?;
        Ok(Some(value))
    }

    /// Raw bytes of a tarball
    pub async fn read_tarball(&self, scope: Option<&str>, name: &str, version: &str) -> CacheResult<Vec<u8>> {
        let path = self.path(scope, name, Some(version))?;
        read(path.tarball_path()?).await
    }

    /// Replace the package document
    pub async fn write_info(&self, scope: Option<&str>, name: &str, info: &Value) -> CacheResult<()> {
        let path = self.path(scope, name, None)?;
        let content =
            serde_json::to_vec_pretty(info).map_err(|e| TrocError::json("Failed to serialize info.json", e))?;

        create_dir_all(&path.dir).await?;
        let tmp_path = Utf8PathBuf::from(format!("{}.tmp", path.info));
        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| TrocError::io(format!("Failed to write {}", tmp_path), e))?;
        tokio::fs::rename(&tmp_path, &path.info)
            .await
            .map_err(|e| TrocError::io(format!("Failed to replace {}", path.info), e))?;

        debug!(path = %path.info, "wrote package document");
        Ok(())
    }

    /// Write a tarball. Tarballs are immutable: an existing file is a
    /// [`TrocError::Conflict`] and is left untouched.
    ///
    /// The bytes go to a temp file in the same directory which is then
    /// hard-linked into place, so readers never see a partial tarball.
    pub async fn write_tarball(&self, scope: Option<&str>, name: &str, version: &str, bytes: &[u8]) -> CacheResult<()> {
        let path = self.path(scope, name, Some(version))?;
        let tarball = path.tarball_path()?;
        let dir = tarball
            .parent()
            .ok_or_else(|| TrocError::Validation(format!("tarball path has no parent: {}", tarball)))?;
        create_dir_all(dir).await?;

        let tmp_path = dir.join(temp_file_name(&tarball_file_name(name, version)));
        let result = link_new_file(&tmp_path, tarball, bytes).await;
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp_path, error = %e, "failed to remove temp tarball");
            }
        }

        result.map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                TrocError::Conflict(format!("{} already exists", tarball_file_name(name, version)))
            }
            _ => TrocError::io(format!("Failed to write {}", tarball), e),
        })?;

        debug!(path = %tarball, size = bytes.len(), "wrote tarball");
        Ok(())
    }

    /// Write every tarball of one publish. If any write fails, the tarballs
    /// already written by this call are removed again before the error is
    /// returned.
    pub async fn write_tarballs<'a, I>(&self, scope: Option<&str>, name: &str, tarballs: I) -> CacheResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut written = Vec::new();
        for (version, bytes) in tarballs {
            if let Err(e) = self.write_tarball(scope, name, version, bytes).await {
                for version in written {
                    if let Err(cleanup) = self.remove_tarball(scope, name, version).await {
                        warn!(version, error = %cleanup, "failed to roll back tarball");
                    }
                }
                return Err(e);
            }
            written.push(version);
        }
        Ok(())
    }

    /// Delete a tarball; a missing one is fine
    pub async fn remove_tarball(&self, scope: Option<&str>, name: &str, version: &str) -> CacheResult<()> {
        let path = self.path(scope, name, Some(version))?;
        let tarball = path.tarball_path()?;
        match tokio::fs::remove_file(tarball).await {
            Ok(()) => {
                debug!(path = %tarball, "removed tarball");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TrocError::io(format!("Failed to remove {}", tarball), e)),
        }
    }
}

/// `.<file>.<pid>.<n>.tmp`, unique within this process
fn temp_file_name(file_name: &str) -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    )
}

async fn link_new_file(tmp_path: &Utf8Path, target: &Utf8Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp_path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::hard_link(tmp_path, target).await
}

async fn exists(path: &Utf8Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn read(path: &Utf8Path) -> CacheResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TrocError::NotFound(path.to_string()),
        _ => TrocError::io(format!("Failed to read {}", path), e),
    })
}

async fn create_dir_all(dir: &Utf8Path) -> CacheResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TrocError::io(format!("Failed to create {}", dir), e))
}
