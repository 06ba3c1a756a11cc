//! The clamped-state cache of a working area.
//!
//! One entry per working area records which job holds the clamped
//! configuration and the exact assembly and geometry it was computed for.
//! A lookup only succeeds for an identical key.

use crate::assembly::Assembly;
use crate::clamping::ClampedState;
use crate::error::CacheError;
use crate::geometry::GeometryParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the cache entry.
pub const CACHE_FILE: &str = "_clamped-state.json";

/// Everything the clamped state depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Validated assembly.
    pub assembly: Assembly,
    /// Geometry and material parameters.
    pub geometry: GeometryParams,
}

impl CacheKey {
    /// Key of an assembly built with the given parameters.
    pub fn new(assembly: &Assembly, geometry: &GeometryParams) -> Self {
        Self {
            assembly: assembly.clone(),
            geometry: geometry.clone(),
        }
    }
}

/// Stored cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the state was computed for.
    pub key: CacheKey,
    /// Clamped state.
    pub state: ClampedState,
}

/// Path of the cache entry in a working area.
pub fn cache_path(workdir: &Path) -> PathBuf {
    workdir.join(CACHE_FILE)
}

/// Store the clamped state, replacing any earlier entry.
pub fn store(workdir: &Path, key: &CacheKey, state: &ClampedState) -> Result<PathBuf, CacheError> {
    let path = cache_path(workdir);
    let entry = CacheEntry {
        key: key.clone(),
        state: state.clone(),
    };
    fs::write(&path, serde_json::to_string_pretty(&entry)?)?;
    info!(path = %path.display(), job = %state.job, "stored clamped state");
    Ok(path)
}

/// Look up the clamped state for `key`.
pub fn load(workdir: &Path, key: &CacheKey) -> Result<ClampedState, CacheError> {
    let path = cache_path(workdir);
    if !path.exists() {
        debug!(path = %path.display(), "no clamped state");
        return Err(CacheError::Missing(workdir.to_path_buf()));
    }
    let entry: CacheEntry = serde_json::from_str(&fs::read_to_string(&path)?)?;
    if entry.key != *key {
        debug!(path = %path.display(), "clamped state is stale");
        return Err(CacheError::Stale(workdir.to_path_buf()));
    }
    info!(job = %entry.state.job, "reusing clamped state");
    Ok(entry.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::ModelInput;

    fn key(mu: f64) -> CacheKey {
        let spec = ModelInput::from_json(&format!(
            r#"{{"assembly": {{"name": "c",
                "bricks": {{"1": {{"type": "regular", "nx": 2, "nz": 2}}}},
                "parts": {{"1": {{"brick_id": 1, "loc": [0, 0, 0]}}}},
                "mesh_size": 0.8, "mu": {mu}}}}}"#
        ))
        .unwrap()
        .validate()
        .unwrap();
        CacheKey::new(&spec.assembly, &spec.dims.params)
    }

    fn state() -> ClampedState {
        ClampedState {
            job: "c".to_string(),
            archive: PathBuf::from("c.odb"),
            step: "free".to_string(),
            increment: Some(2),
        }
    }

    #[test]
    fn roundtrip_with_identical_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = store(dir.path(), &key(0.2), &state()).unwrap();
        assert!(path.ends_with(CACHE_FILE));
        assert_eq!(load(dir.path(), &key(0.2)).unwrap(), state());
    }

    #[test]
    fn missing_and_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(dir.path(), &key(0.2)), Err(CacheError::Missing(_))));
        store(dir.path(), &key(0.2), &state()).unwrap();
        assert!(matches!(load(dir.path(), &key(0.3)), Err(CacheError::Stale(_))));

        let mut geometry = key(0.2);
        geometry.geometry.delta_r = 0.06;
        assert!(matches!(load(dir.path(), &geometry), Err(CacheError::Stale(_))));
    }

    #[test]
    fn corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(cache_path(dir.path()), "{").unwrap();
        assert!(matches!(load(dir.path(), &key(0.2)), Err(CacheError::Json(_))));
    }
}
