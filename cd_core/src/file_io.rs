//! # File I/O Module
//!
//! Writes drawing sets to disk and loads configuration and requirement files:
//! - **Atomic writes**: every artifact goes to a `.tmp` sibling, is synced,
//!   then renamed into place
//! - **Directory locking**: an output directory holds one writer at a time
//! - **Version validation**: config files carry a schema version
//!
//! ## Example
//!
//! ```rust,no_run
//! use cd_core::file_io::{write_artifacts, OutputLock};
//! use std::path::Path;
//!
//! # let artifacts: Vec<cd_core::export::Artifact> = Vec::new();
//! let out = Path::new("drawings");
//! let lock = OutputLock::acquire(out, "designer@studio.com")?;
//! let written = write_artifacts(&lock, &artifacts)?;
//! drop(lock);
//! # Ok::<(), cd_core::errors::CdError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{GenerationConfig, SCHEMA_VERSION};
use crate::errors::{CdError, CdResult};
use crate::export::{Artifact, Bundle};
use crate::requirements::RequirementsInput;

/// Name of the lock file placed inside a locked output directory
pub const LOCK_FILE_NAME: &str = ".planset.lock";

/// Lock file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    /// Machine name where lock was acquired
    pub machine: String,
    /// Process ID that holds the lock
    pub pid: u32,
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::env::var("HOST").ok())
    }
}

/// Exclusive hold on an output directory, released on drop.
///
/// Combines an OS-level advisory lock (fs2) with a readable lock file so
/// other users can see who is writing.
pub struct OutputLock {
    dir: PathBuf,
    lock_path: PathBuf,
    _lock_file: File,
    pub info: LockInfo,
}

impl OutputLock {
    /// Lock `dir`, creating it if needed
    pub fn acquire(dir: &Path, user_id: impl Into<String>) -> CdResult<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| CdError::file_error("create directory", dir.display().to_string(), e.to_string()))?;
        let lock_path = dir.join(LOCK_FILE_NAME);
        let info = LockInfo::new(user_id);

        if let Some(existing) = Self::check(dir) {
            return Err(CdError::file_locked(
                dir.display().to_string(),
                format!("{} ({})", existing.user_id, existing.machine),
                existing.locked_at.to_rfc3339(),
            ));
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| CdError::file_error("create lock", lock_path.display().to_string(), e.to_string()))?;

        lock_file.try_lock_exclusive().map_err(|_| {
            CdError::file_locked(dir.display().to_string(), "another process", "unknown")
        })?;

        let lock_json = serde_json::to_string_pretty(&info)?;
        lock_file
            .write_all(lock_json.as_bytes())
            .map_err(|e| CdError::file_error("write lock", lock_path.display().to_string(), e.to_string()))?;
        lock_file
            .sync_all()
            .map_err(|e| CdError::file_error("sync lock", lock_path.display().to_string(), e.to_string()))?;

        debug!(dir = %dir.display(), user = %info.user_id, "output directory locked");
        Ok(OutputLock {
            dir: dir.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Current holder of a directory lock, if it is still live
    pub fn check(dir: &Path) -> Option<LockInfo> {
        let info = read_lock_info(&dir.join(LOCK_FILE_NAME)).ok()?;
        (!is_lock_stale(&info)).then_some(info)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn read_lock_info(lock_path: &Path) -> CdResult<LockInfo> {
    let mut file = File::open(lock_path)
        .map_err(|e| CdError::file_error("read lock", lock_path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| CdError::file_error("read lock", lock_path.display().to_string(), e.to_string()))?;
    Ok(serde_json::from_str(&contents)?)
}

/// A lock whose process is gone, or older than a day, can be taken over
fn is_lock_stale(info: &LockInfo) -> bool {
    if hostname().is_some_and(|ours| ours == info.machine) {
        #[cfg(unix)]
        {
            if fs::metadata(format!("/proc/{}", info.pid)).is_err() {
                return true;
            }
        }
    }
    (Utc::now() - info.locked_at).num_hours() > 24
}

/// Write bytes to `path` through a synced temp file and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CdResult<()> {
    let tmp_path = tmp_path_for(path);

    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| CdError::file_error("create temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .write_all(bytes)
        .map_err(|e| CdError::file_error("write temp file", tmp_path.display().to_string(), e.to_string()))?;
    tmp_file
        .sync_all()
        .map_err(|e| CdError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string()))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CdError::file_error("rename to final", path.display().to_string(), e.to_string())
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write every artifact into the locked directory. Returns the paths written.
pub fn write_artifacts(lock: &OutputLock, artifacts: &[Artifact]) -> CdResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = lock.dir().join(&artifact.file_name);
        write_atomic(&path, &artifact.bytes)?;
        written.push(path);
    }
    info!(dir = %lock.dir().display(), files = written.len(), "artifacts written");
    Ok(written)
}

pub fn write_bundle(lock: &OutputLock, bundle: &Bundle) -> CdResult<PathBuf> {
    let path = lock.dir().join(&bundle.file_name);
    write_atomic(&path, &bundle.bytes)?;
    Ok(path)
}

fn read_to_string(path: &Path) -> CdResult<String> {
    let mut file =
        File::open(path).map_err(|e| CdError::file_error("open", path.display().to_string(), e.to_string()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| CdError::file_error("read", path.display().to_string(), e.to_string()))?;
    Ok(contents)
}

pub fn save_config(config: &GenerationConfig, path: &Path) -> CdResult<()> {
    let json = serde_json::to_string_pretty(config)?;
    write_atomic(path, json.as_bytes())
}

/// Load, version-check and validate a config file
pub fn load_config(path: &Path) -> CdResult<GenerationConfig> {
    let contents = read_to_string(path)?;
    let config: GenerationConfig = serde_json::from_str(&contents).map_err(|e| CdError::SerializationError {
        reason: format!("Invalid JSON in {}: {}", path.display(), e),
    })?;
    validate_version(&config.version)?;
    config.validate()?;
    Ok(config)
}

/// Read a requirements file: `.json` as structured requests, anything else
/// as free text
pub fn load_requirements(path: &Path) -> CdResult<RequirementsInput> {
    let contents = read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(RequirementsInput::Text(contents))
    }
}

/// Major must match; in 0.x the file's minor may not be newer than ours
fn validate_version(file_version: &str) -> CdResult<()> {
    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    let file_parts = parse(file_version);
    let current_parts = parse(SCHEMA_VERSION);
    let mismatch = || CdError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    if file_parts.is_empty() || current_parts.is_empty() || file_parts[0] != current_parts[0] {
        return Err(mismatch());
    }
    if current_parts[0] == 0 && file_parts.len() > 1 && current_parts.len() > 1 && file_parts[1] > current_parts[1] {
        return Err(mismatch());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportFormat;
    use crate::export::ArtifactTarget;

    #[test]
    fn test_lock_info_creation() {
        let info = LockInfo::new("test@example.com");
        assert_eq!(info.user_id, "test@example.com");
        assert!(info.pid > 0);
    }

    #[test]
    fn test_lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("drawings");

        let lock = OutputLock::acquire(&out, "test@example.com").unwrap();
        let lock_path = out.join(LOCK_FILE_NAME);
        assert!(lock_path.exists());
        assert_eq!(OutputLock::check(&out).map(|i| i.user_id), Some("test@example.com".to_string()));

        // Second writer is refused while the first holds the directory
        let err = OutputLock::acquire(&out, "other@example.com").err().unwrap();
        assert_eq!(err.error_code(), "FILE_LOCKED");

        drop(lock);
        assert!(!lock_path.exists());
        assert!(OutputLock::acquire(&out, "other@example.com").is_ok());
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let stale = LockInfo {
            user_id: "gone@example.com".to_string(),
            machine: "elsewhere".to_string(),
            pid: 1,
            locked_at: Utc::now() - chrono::Duration::hours(48),
        };
        fs::write(dir.path().join(LOCK_FILE_NAME), serde_json::to_string(&stale).unwrap()).unwrap();
        assert!(OutputLock::check(dir.path()).is_none());
        assert!(OutputLock::acquire(dir.path(), "me@example.com").is_ok());
    }

    #[test]
    fn test_atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = OutputLock::acquire(dir.path(), "test").unwrap();
        let artifacts = vec![Artifact::new(
            ExportFormat::Cad,
            "P-001_A1.01.dxf".to_string(),
            ArtifactTarget::Sheet("A1.01".to_string()),
            b"  0\nEOF\n".to_vec(),
        )];
        let written = write_artifacts(&lock, &artifacts).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(fs::read(&written[0]).unwrap(), b"  0\nEOF\n");
        assert!(!tmp_path_for(&written[0]).exists());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = GenerationConfig::default().with_formats(&[ExportFormat::Cad, ExportFormat::Page]);
        config.seed = 7;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_config_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = GenerationConfig::default();
        config.plan.grid_mm = 0;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap_err().error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_requirements_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("program.txt");
        fs::write(&text, "Living: 25 m2\n").unwrap();
        assert!(matches!(load_requirements(&text).unwrap(), RequirementsInput::Text(_)));

        let json = dir.path().join("program.json");
        fs::write(&json, r#"[{"name": "Living", "area_m2": 25.0}]"#).unwrap();
        assert!(matches!(load_requirements(&json).unwrap(), RequirementsInput::Structured(_)));
    }

    #[test]
    fn test_version_validation() {
        assert!(validate_version(SCHEMA_VERSION).is_ok());
        assert!(validate_version("0.1.5").is_ok());
        assert!(validate_version("1.0.0").is_err());
        assert!(validate_version("0.2.0").is_err());
        assert!(validate_version("garbage").is_err());
    }
}
