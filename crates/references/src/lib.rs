//! `realitycap-references`: bookkeeping between local data paths and the
//! reality data ids they were uploaded as.
//!
//! A [`ReferenceTable`] is a one-to-one mapping that can be persisted as a
//! plain text file, one `local_path,cloud_id` pair per line. Paths may
//! contain commas; ids may not, so each line is split at its last comma.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use realitycap_core::RealityDataId;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to access reference file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed reference entry at line {line}")]
    Malformed { line: usize },

    #[error("invalid reference ({local_path:?}, {cloud_id}): {reason}")]
    Invalid {
        local_path: String,
        cloud_id: RealityDataId,
        reason: &'static str,
    },

    #[error("conflicting reference ({local_path:?}, {cloud_id}): {existing}")]
    Conflict {
        local_path: String,
        cloud_id: RealityDataId,
        existing: String,
    },
}

pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Bidirectional local path <-> cloud id mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    by_path: BTreeMap<String, RealityDataId>,
    by_id: HashMap<RealityDataId, String>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn has_local_path(&self, local_path: &str) -> bool {
        self.by_path.contains_key(local_path)
    }

    pub fn has_cloud_id(&self, cloud_id: &RealityDataId) -> bool {
        self.by_id.contains_key(cloud_id)
    }

    pub fn get_cloud_id_from_local_path(&self, local_path: &str) -> Option<&RealityDataId> {
        self.by_path.get(local_path)
    }

    pub fn get_local_path_from_cloud_id(&self, cloud_id: &RealityDataId) -> Option<&str> {
        self.by_id.get(cloud_id).map(String::as_str)
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RealityDataId)> {
        self.by_path.iter().map(|(path, id)| (path.as_str(), id))
    }

    /// Record that `local_path` was uploaded as `cloud_id`.
    ///
    /// Adding the exact same pair twice is a no-op. Either side already being
    /// mapped to something else is a [`ReferenceError::Conflict`], and the
    /// table is left unchanged.
    pub fn add_reference(
        &mut self,
        local_path: impl Into<String>,
        cloud_id: RealityDataId,
    ) -> ReferenceResult<()> {
        let local_path = local_path.into();
        validate(&local_path, &cloud_id)?;

        match (self.by_path.get(&local_path), self.by_id.get(&cloud_id)) {
            (Some(existing), _) if *existing == cloud_id => return Ok(()),
            (Some(existing), _) => {
                let existing = format!("path already mapped to {existing}");
                return Err(ReferenceError::Conflict {
                    local_path,
                    cloud_id,
                    existing,
                });
            }
            (None, Some(existing)) => {
                let existing = format!("id already mapped to {existing:?}");
                return Err(ReferenceError::Conflict {
                    local_path,
                    cloud_id,
                    existing,
                });
            }
            (None, None) => {}
        }

        self.by_id.insert(cloud_id.clone(), local_path.clone());
        self.by_path.insert(local_path, cloud_id);
        Ok(())
    }

    /// Forget `local_path`; returns the id it was mapped to.
    pub fn remove_local_path(&mut self, local_path: &str) -> Option<RealityDataId> {
        let id = self.by_path.remove(local_path)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Merge the entries of a reference file into this table.
    ///
    /// Entries are applied in file order under the same rules as
    /// [`ReferenceTable::add_reference`]. On error, entries before the
    /// failing line have already been merged.
    pub fn load(&mut self, path: impl AsRef<Path>) -> ReferenceResult<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let before = self.len();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (local_path, cloud_id) = parse_line(line, index + 1)?;
            self.add_reference(local_path, cloud_id).map_err(|err| match err {
                ReferenceError::Invalid { .. } => ReferenceError::Malformed { line: index + 1 },
                other => other,
            })?;
        }
        debug!(path = %path.display(), added = self.len() - before, "reference table loaded");
        Ok(())
    }

    /// Write the table, sorted by path, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> ReferenceResult<()> {
        let path = path.as_ref();
        let mut out = String::new();
        for (local_path, cloud_id) in self.iter() {
            out.push_str(local_path);
            out.push(',');
            out.push_str(cloud_id.as_str());
            out.push('\n');
        }
        fs::write(path, out).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = self.len(), "reference table saved");
        Ok(())
    }
}

fn parse_line(line: &str, number: usize) -> ReferenceResult<(&str, RealityDataId)> {
    let (local_path, cloud_id) = line
        .rsplit_once(',')
        .ok_or(ReferenceError::Malformed { line: number })?;
    let cloud_id = cloud_id.trim();
    if local_path.is_empty() || cloud_id.is_empty() {
        return Err(ReferenceError::Malformed { line: number });
    }
    Ok((local_path, RealityDataId::new(cloud_id)))
}

/// Entries must survive a save/load cycle unchanged.
fn validate(local_path: &str, cloud_id: &RealityDataId) -> ReferenceResult<()> {
    let reason = if local_path.is_empty() {
        Some("empty local path")
    } else if local_path.contains(['\n', '\r']) {
        Some("local path contains a line break")
    } else if cloud_id.as_str().trim().is_empty() {
        Some("empty cloud id")
    } else if cloud_id.as_str() != cloud_id.as_str().trim() {
        Some("cloud id has surrounding whitespace")
    } else if cloud_id.as_str().contains([',', '\n', '\r']) {
        Some("cloud id contains a separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ReferenceError::Invalid {
            local_path: local_path.to_string(),
            cloud_id: cloud_id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}
