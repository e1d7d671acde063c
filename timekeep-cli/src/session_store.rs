use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::{io::Write, os::unix::fs::OpenOptionsExt};
use timekeep::{Credential, SessionStorage};

use crate::config::TimekeepConfig;

/// Session files under the config directory, readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    root: PathBuf,
}

impl FileSessionStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(TimekeepConfig::root_dir()?))
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.root.join("cookies")
    }
}

fn secure_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    {
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?
            .write_all(content.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, content)?;
    }

    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

impl SessionStorage for FileSessionStorage {
    fn load_credential(&self) -> Result<Option<Credential>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let credential = serde_json::from_str(&raw).context("Failed to parse session file")?;
        Ok(Some(credential))
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        let raw = serde_json::to_string_pretty(credential)?;
        secure_write(&self.session_path(), &raw)
    }

    fn load_cookies(&self) -> Result<Vec<(String, String)>> {
        let path = self.cookies_path();
        if !path.exists() {
            return Ok(vec![]);
        }

        let raw = std::fs::read_to_string(path).context("Failed to read cookies")?;
        Ok(raw
            .lines()
            .filter_map(|line| {
                let (name, value) = line.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    None
                } else {
                    Some((name.to_string(), value.trim().to_string()))
                }
            })
            .collect())
    }

    fn save_cookies(&self, cookies: &[(String, String)]) -> Result<()> {
        let content = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("\n");
        secure_write(&self.cookies_path(), &content)
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.session_path())?;
        remove_if_exists(&self.cookies_path())
    }
}
