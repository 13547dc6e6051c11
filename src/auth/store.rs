use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::token::TokenPair;

const SESSION_FILE_NAME: &str = "session.toml";
const SESSION_FILE_VERSION: u32 = 1;

/// Durable storage for the token pair.
pub trait TokenPersistence: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>, AuthError>;
    fn save(&self, pair: &TokenPair) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// File-backed persistence holding the access and refresh token keys in a
/// single TOML file.
///
/// # Example
/// ```no_run
/// use homebase::auth::{FileTokenPersistence, TokenPair, TokenPersistence};
///
/// let persistence = FileTokenPersistence::new_default();
/// persistence.save(&TokenPair::new("access", Some("refresh".to_string())))?;
/// # Ok::<(), homebase::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenPersistence {
    path: PathBuf,
}

impl FileTokenPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(SESSION_FILE_NAME),
        }
    }

    pub fn new_default() -> Self {
        Self::new(default_token_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenPersistence for FileTokenPersistence {
    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Storage(err.to_string())),
        };
        let file: SessionFile = toml::from_str(&raw)?;
        if file.version != SESSION_FILE_VERSION {
            return Err(AuthError::Storage(format!(
                "unsupported session file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(file.access_token.map(|access| TokenPair::new(access, file.refresh_token)))
    }

    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            access_token: Some(pair.access_token.clone()),
            refresh_token: pair.refresh_token.clone(),
            saved_at: Some(Utc::now()),
        };
        let serialized = toml::to_string(&file)?;
        atomic_write(&self.path, serialized.as_bytes())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Storage(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    access_token: Option<String>,
    refresh_token: Option<String>,
    saved_at: Option<DateTime<Utc>>,
}

/// In-process persistence, for tests and embedders that bring their own
/// durable layer.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }

    /// Current durable contents.
    pub fn snapshot(&self) -> Option<TokenPair> {
        self.pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenPersistence for MemoryTokenPersistence {
    fn load(&self) -> Result<Option<TokenPair>, AuthError> {
        Ok(self.snapshot())
    }

    fn save(&self, pair: &TokenPair) -> Result<(), AuthError> {
        *self.pair.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.pair.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// In-memory owner of the current token pair, written through to
/// [`TokenPersistence`] on every change.
///
/// The cached bearer header is rebuilt on every [`set`](Self::set), so the
/// next request always sees the latest pair.
pub struct TokenStore {
    persistence: Arc<dyn TokenPersistence>,
    current: RwLock<Option<StoredSession>>,
}

struct StoredSession {
    pair: TokenPair,
    bearer: HeaderValue,
}

impl StoredSession {
    fn new(pair: TokenPair) -> Result<Self, AuthError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", pair.access_token))
            .map_err(|_| AuthError::InvalidToken("access token is not a valid header value".into()))?;
        bearer.set_sensitive(true);
        Ok(Self { pair, bearer })
    }
}

impl TokenStore {
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        Self {
            persistence,
            current: RwLock::new(None),
        }
    }

    /// Replace the pair, or clear it with `None`.
    ///
    /// A new pair is persisted before memory changes; on a persistence
    /// failure memory keeps the previous pair. Clearing always empties
    /// memory, and reports a durable-clear failure afterwards.
    pub fn set(&self, pair: Option<TokenPair>) -> Result<(), AuthError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match pair {
            Some(pair) => {
                let session = StoredSession::new(pair)?;
                self.persistence.save(&session.pair)?;
                *current = Some(session);
                tracing::debug!("token pair replaced");
                Ok(())
            }
            None => {
                let cleared = self.persistence.clear();
                *current = None;
                tracing::debug!("token pair cleared");
                cleared
            }
        }
    }

    /// Clear the pair. Shorthand for `set(None)`.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.set(None)
    }

    /// Adopt a pair that was just read from durable storage, without
    /// writing it back.
    pub fn restore(&self, pair: TokenPair) -> Result<(), AuthError> {
        let session = StoredSession::new(pair)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Read the durable pair.
    pub fn load_persisted(&self) -> Result<Option<TokenPair>, AuthError> {
        self.persistence.load()
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.read(|session| session.pair.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(|session| session.pair.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(|session| session.pair.refresh_token.clone())
            .flatten()
    }

    /// `Authorization` header value for the current access token.
    pub fn bearer_header(&self) -> Option<HeaderValue> {
        self.read(|session| session.bearer.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.read(|_| ()).is_none()
    }

    fn read<T>(&self, f: impl FnOnce(&StoredSession) -> T) -> Option<T> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}

fn default_token_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".homebase"))
        .unwrap_or_else(|| PathBuf::from(".homebase"))
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AuthError::Storage(format!("{} has no file name", path.display())))?;
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        file_name.to_string_lossy(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
