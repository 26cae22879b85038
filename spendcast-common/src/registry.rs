//! Model registry and promoter
//!
//! Layout under the models directory:
//!
//! ```text
//! models/
//!   current_model.txt          active version pointer (single line)
//!   promoted/<version>.json    immutable artifact
//!   promoted/<version>.sha256  checksum written after the artifact
//! ```
//!
//! Promotion writes the artifact completely before the pointer moves, and
//! the pointer itself is replaced with a rename, so a reader never observes
//! a pointer to a partially written artifact. Rollback only re-points.

use crate::events::{EventKind, EventLogger};
use crate::model::RegressionModel;
use crate::{Error, Result};
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const POINTER_FILE: &str = "current_model.txt";
pub const PROMOTED_DIR: &str = "promoted";

const ARTIFACT_EXT: &str = "json";
const CHECKSUM_EXT: &str = "sha256";

/// Filesystem-backed model registry
#[derive(Clone)]
pub struct ModelRegistry {
    models_dir: PathBuf,
    events: EventLogger,
}

impl ModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>, events: EventLogger) -> Self {
        Self {
            models_dir: models_dir.into(),
            events,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.models_dir.join(POINTER_FILE)
    }

    pub fn promoted_dir(&self) -> PathBuf {
        self.models_dir.join(PROMOTED_DIR)
    }

    pub fn artifact_path(&self, version: &str) -> PathBuf {
        self.promoted_dir().join(format!("{}.{}", version, ARTIFACT_EXT))
    }

    fn checksum_path(&self, version: &str) -> PathBuf {
        self.promoted_dir().join(format!("{}.{}", version, CHECKSUM_EXT))
    }

    /// Fresh version id: `model_<UTC timestamp>_<8 hex>`
    pub fn next_version_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("model_{}_{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"), &suffix[..8])
    }

    /// Store `model` under `version`, then make it the active version
    pub fn promote(&self, model: &RegressionModel, version: &str) -> Result<PathBuf> {
        validate_version(version)?;
        std::fs::create_dir_all(self.promoted_dir())?;

        let artifact = self.artifact_path(version);
        if artifact.exists() {
            return Err(Error::InvalidInput(format!(
                "version {} already exists; artifacts are immutable",
                version
            )));
        }

        let bytes = serde_json::to_vec_pretty(model)?;
        write_atomically(&artifact, &bytes, true)?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        write_atomically(&self.checksum_path(version), digest.as_bytes(), false)?;
        debug!("Wrote artifact {} ({} bytes)", artifact.display(), bytes.len());

        let previous = self.current_version()?;
        self.set_pointer(version)?;

        self.events.log_message(format!("Promoted model version {}", version));
        self.events.log_event(
            EventKind::ModelPromoted,
            json!({
                "version": version,
                "previous_version": previous,
                "artifact": artifact.display().to_string(),
                "sha256": digest,
            }),
        );

        Ok(artifact)
    }

    /// Re-point to an already stored version; artifacts are untouched
    pub fn rollback(&self, version: &str) -> Result<()> {
        validate_version(version)?;
        // Loading verifies presence and checksum before the pointer moves.
        self.load(version)?;

        let previous = self.current_version()?;
        self.set_pointer(version)?;

        self.events.log_message(format!("Rolled back to model version {}", version));
        self.events.log_event(
            EventKind::ModelRolledBack,
            json!({ "version": version, "previous_version": previous }),
        );
        Ok(())
    }

    /// Active version, or `None` when the pointer is missing or blank
    pub fn current_version(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(self.pointer_path()) {
            Ok(content) => {
                let version = content.trim();
                if version.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(version.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn has_version(&self, version: &str) -> bool {
        validate_version(version).is_ok() && self.artifact_path(version).is_file()
    }

    /// Read, verify and deserialize a stored artifact
    pub fn load(&self, version: &str) -> Result<RegressionModel> {
        validate_version(version)?;
        let path = self.artifact_path(version);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("model version {}", version)))
            }
            Err(e) => return Err(e.into()),
        };

        match std::fs::read_to_string(self.checksum_path(version)) {
            Ok(expected) => {
                let actual = format!("{:x}", Sha256::digest(&bytes));
                if expected.trim() != actual {
                    return Err(Error::Model(format!(
                        "checksum mismatch for version {}",
                        version
                    )));
                }
            }
            // Artifacts copied in by hand may have no checksum.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checksum stored for version {}", version);
            }
            Err(e) => return Err(e.into()),
        }

        let model: RegressionModel = serde_json::from_slice(&bytes)?;
        model.check_compatible()?;
        Ok(model)
    }

    /// Stored versions, oldest first (version ids sort chronologically)
    pub fn versions(&self) -> Result<Vec<String>> {
        let dir = self.promoted_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                versions.push(stem.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn set_pointer(&self, version: &str) -> Result<()> {
        std::fs::create_dir_all(&self.models_dir)?;
        write_atomically(&self.pointer_path(), format!("{}\n", version).as_bytes(), false)?;
        info!("Active model version is now {}", version);
        Ok(())
    }
}

/// Version ids become file names, so keep them to a safe alphabet
fn validate_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && version.len() <= 128
        && !version.starts_with('.')
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("invalid version id: {:?}", version)))
    }
}

/// Write to a sibling temp file, fsync, then move it over `path`.
///
/// With `exclusive`, fails if `path` already exists instead of replacing it.
/// The temp file is removed on every error path.
fn write_atomically(path: &Path, bytes: &[u8], exclusive: bool) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Internal(format!("invalid path {}", path.display())))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".partial")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if exclusive {
        tmp.persist_noclobber(path).map_err(|e| match e.error.kind() {
            std::io::ErrorKind::AlreadyExists => {
                Error::InvalidInput(format!("{} already exists", path.display()))
            }
            _ => Error::from(e.error),
        })?;
    } else {
        tmp.persist(path).map_err(|e| Error::from(e.error))?;
    }

    // Persist the directory entry; not supported on every platform.
    if let Ok(dir) = File::open(dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::features::{FeatureColumn, FeatureMatrix, FeatureValues};
    use std::sync::Arc;

    fn model(scale: f64) -> RegressionModel {
        let x = FeatureMatrix::new(vec![FeatureColumn {
            name: "quantity".into(),
            values: FeatureValues::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)]),
        }])
        .unwrap();
        RegressionModel::fit(&x, &[scale, 2.0 * scale, 3.0 * scale], "total_cost", 0.0).unwrap()
    }

    fn registry() -> (tempfile::TempDir, ModelRegistry, Arc<MemorySink>) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let registry = ModelRegistry::new(dir.path().join("models"), EventLogger::new().with_sink(sink.clone()));
        (dir, registry, sink)
    }

    #[test]
    fn test_no_pointer_means_no_version() {
        let (_dir, registry, _) = registry();
        assert_eq!(registry.current_version().unwrap(), None);

        std::fs::create_dir_all(registry.models_dir()).unwrap();
        std::fs::write(registry.pointer_path(), "  \n").unwrap();
        assert_eq!(registry.current_version().unwrap(), None);
    }

    #[test]
    fn test_promote_writes_artifact_then_pointer() {
        let (_dir, registry, sink) = registry();
        let m = model(1.0);

        let path = registry.promote(&m, "v1").unwrap();

        assert!(path.is_file());
        assert_eq!(registry.current_version().unwrap().as_deref(), Some("v1"));
        assert_eq!(registry.load("v1").unwrap().trained_at, m.trained_at);
        assert_eq!(sink.kinds(), vec![EventKind::ModelPromoted]);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(registry.promoted_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_versions_are_immutable() {
        let (_dir, registry, _) = registry();
        let original = model(1.0);
        registry.promote(&original, "v1").unwrap();

        let result = registry.promote(&model(2.0), "v1");
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(registry.load("v1").unwrap().trained_at, original.trained_at);
    }

    #[test]
    fn test_exclusive_write_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.json");

        write_atomically(&path, b"first", true).unwrap();
        let result = write_atomically(&path, b"second", true);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        // Replacing writes still go through
        write_atomically(&path, b"third", false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"third");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["v1.json".to_string()]);
    }

    #[test]
    fn test_rollback_repoints_without_touching_artifacts() {
        let (_dir, registry, sink) = registry();
        registry.promote(&model(1.0), "v1").unwrap();
        registry.promote(&model(2.0), "v2").unwrap();
        let v2_bytes = std::fs::read(registry.artifact_path("v2")).unwrap();

        registry.rollback("v1").unwrap();

        assert_eq!(registry.current_version().unwrap().as_deref(), Some("v1"));
        assert_eq!(std::fs::read(registry.artifact_path("v2")).unwrap(), v2_bytes);
        assert_eq!(registry.versions().unwrap(), vec!["v1".to_string(), "v2".to_string()]);
        assert_eq!(sink.kinds().last(), Some(&EventKind::ModelRolledBack));
    }

    #[test]
    fn test_rollback_to_unknown_version_keeps_pointer() {
        let (_dir, registry, _) = registry();
        registry.promote(&model(1.0), "v1").unwrap();

        assert!(matches!(registry.rollback("v9"), Err(Error::NotFound(_))));
        assert_eq!(registry.current_version().unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn test_load_detects_tampered_artifact() {
        let (_dir, registry, _) = registry();
        registry.promote(&model(1.0), "v1").unwrap();

        let path = registry.artifact_path("v1");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push(' ');
        std::fs::write(&path, content).unwrap();

        assert!(matches!(registry.load("v1"), Err(Error::Model(_))));
    }

    #[test]
    fn test_rejects_path_like_versions() {
        let (_dir, registry, _) = registry();
        assert!(registry.promote(&model(1.0), "../escape").is_err());
        assert!(registry.promote(&model(1.0), "").is_err());
        assert!(!registry.has_version("../escape"));
    }

    #[test]
    fn test_next_version_ids_are_unique_and_valid() {
        let a = ModelRegistry::next_version_id();
        let b = ModelRegistry::next_version_id();
        assert_ne!(a, b);
        assert!(a.starts_with("model_"));
        validate_version(&a).unwrap();
    }
}
