//! JSON persistence for rules and settings.
//!
//! Files live in one directory (`routes.json`, `settings.json`). Output is
//! pretty-printed with sorted keys; saves go through a temp file in the same
//! directory and a rename, so a crash never leaves a truncated file. Loads
//! never fail: see [`rules`] and [`settings`].

pub mod rules;
pub mod settings;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config;

/// Owns the configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `explicit` if given, else `$PINROUTES_CONFIG_DIR`, else the platform config dir.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        let env = std::env::var_os(config::CONFIG_DIR_ENV).map(PathBuf::from);
        match resolve_dir(explicit, env, dirs::config_dir()) {
            Some(dir) => Ok(Self::new(dir)),
            None => bail!(
                "could not determine a configuration directory; set {}",
                config::CONFIG_DIR_ENV
            ),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

fn resolve_dir(
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    platform: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit
        .or(env.filter(|p| !p.as_os_str().is_empty()))
        .or_else(|| platform.map(|base| base.join(config::CONFIG_DIR_NAME)))
}

/// `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    // Round-trip through `Value`, whose maps are ordered, to get sorted keys.
    let value = serde_json::to_value(value)?;
    let text = serde_json::to_string_pretty(&value)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
