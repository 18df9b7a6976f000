
use crate::{Error, ErrorKind, Result};

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentDetail {
    /// uid, euid, gid, egid
    Simple,
    /// additionally suid, fsuid, sgid, fsgid
    Complete,
}

impl Default for AgentDetail {
    fn default() -> Self {
        AgentDetail::Simple
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agents: AgentDetail,
    /// Whether setfsuid/setfsgid produce agent updates.
    pub fs_credentials: bool,
    /// Inject unit id "0" into every containing process.
    pub units: bool,
    pub namespaces: bool,
    /// Draw agents as their own vertices linked by controlled-by edges.
    pub agent_vertices: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| Error::new(ErrorKind::Config, e))
    }

    pub(crate) fn unit_id(&self) -> Option<String> {
        if self.units {
            Some(String::from("0"))
        } else {
            None
        }
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub cache_capacity: usize,
    pub spill_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            spill_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::new(
                ErrorKind::Config,
                "cache capacity must be greater than 0",
            ));
        }
        if let Some(dir) = &self.spill_dir {
            if !dir.is_dir() {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("spill directory {} is not a directory", dir.display()),
                ));
            }
        }
        Ok(())
    }
}
