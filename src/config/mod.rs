use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Size thresholds past which a collection should leave its compact
/// encoding. The encodings never enforce these themselves; they only answer
/// the size queries the limits are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub intset_max_entries: u32,
    pub compact_map_max_entries: u32,
    /// Longest key or value a compact map may hold.
    pub compact_map_max_value: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            intset_max_entries: 512,
            compact_map_max_entries: 64,
            compact_map_max_value: 512,
        }
    }
}

impl Limits {
    /// Reads the limits stored in `dir`. If there are none yet, the defaults
    /// are written there and returned.
    pub fn load<P>(dir: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = Self::path(dir.as_ref());
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let limits: Limits = serde_json::from_str(contents.as_str())
                    .with_context(|| format!("parsing {}", path.display()))?;
                tracing::debug!(path = %path.display(), ?limits, "loaded limits");
                Ok(limits)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no limits file, writing defaults");
                let limits = Self::default();
                limits.store(dir)?;
                Ok(limits)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Writes the limits to `dir`, replacing any previous file in one step.
    pub fn store<P>(&self, dir: P) -> anyhow::Result<()>
    where
        P: AsRef<Path>,
    {
        let tmp_path = Self::tmp_path(dir.as_ref());
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let encoded = serde_json::to_string_pretty(self)?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;

        fs::rename(&tmp_path, Self::path(dir.as_ref()))?;
        Ok(())
    }

    /// Whether a key/value pair is short enough to live in a compact map.
    pub fn admits_map_entry(&self, key: &[u8], value: &[u8]) -> bool {
        key.len() <= self.compact_map_max_value && value.len() <= self.compact_map_max_value
    }

    fn path(dir: &Path) -> PathBuf {
        dir.join("LIMITS")
    }

    fn tmp_path(dir: &Path) -> PathBuf {
        dir.join("LIMITS_TMP")
    }
}
