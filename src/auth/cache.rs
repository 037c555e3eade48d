use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::auth::credential::Credential;
use crate::error::CacheError;

/// Single-record store for the account's credential.
pub trait CredentialCache: Send + Sync {
    /// `Ok(None)` when nothing is stored; `CacheError::Malformed` when the
    /// stored record cannot be decoded.
    fn load(&self) -> Result<Option<Credential>, CacheError>;
    fn save(&self, credential: &Credential) -> Result<(), CacheError>;
    fn evict(&self) -> Result<(), CacheError>;
}

/// Credential cache kept as a JSON file (mode 0600 on unix).
#[derive(Debug, Clone)]
pub struct FileCredentialCache {
    path: PathBuf,
}

impl FileCredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialCache for FileCredentialCache {
    fn load(&self) -> Result<Option<Credential>, CacheError> {
        let s = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_str(&s)?;
        Ok(Some(credential))
    }

    /// Writes next to the target then renames over it, so a crash mid-write
    /// leaves either the old record or the new one.
    fn save(&self, credential: &Credential) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }

        let s = serde_json::to_string_pretty(credential)?;
        let tmp = self.tmp_path();
        let written =
            write_owner_only(&tmp, s.as_bytes()).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!("saved credential to {}", self.path.display());
        Ok(())
    }

    fn evict(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("evicted credential at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The file never exists with wider permissions than 0600, and its bytes
/// are on disk before it is renamed into place.
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
