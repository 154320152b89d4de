use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Keys the client persists for the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionKey {
    AccessToken,
    RefreshToken,
    UserId,
    UserEmail,
    UserName,
}

impl SessionKey {
    pub const ALL: [SessionKey; 5] = [
        SessionKey::AccessToken,
        SessionKey::RefreshToken,
        SessionKey::UserId,
        SessionKey::UserEmail,
        SessionKey::UserName,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionKey::AccessToken => "access_token",
            SessionKey::RefreshToken => "refresh_token",
            SessionKey::UserId => "user_id",
            SessionKey::UserEmail => "user_email",
            SessionKey::UserName => "user_name",
        }
    }
}

/// Single owner of persisted session state. Every component reads and
/// writes credentials through this trait.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: SessionKey) -> Option<String>;
    fn set(&self, key: SessionKey, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: SessionKey) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthSession {
    /// `None` unless an access token is stored.
    pub fn load(store: &dyn SessionStore) -> Option<Self> {
        let access_token = store.get(SessionKey::AccessToken)?;
        Some(Self {
            access_token,
            refresh_token: store.get(SessionKey::RefreshToken),
            user_id: store.get(SessionKey::UserId),
            email: store.get(SessionKey::UserEmail),
            display_name: store.get(SessionKey::UserName),
        })
    }

    /// Replaces whatever session was stored before.
    pub fn save(&self, store: &dyn SessionStore) -> anyhow::Result<()> {
        store.clear()?;
        store.set(SessionKey::AccessToken, &self.access_token)?;
        let optional = [
            (SessionKey::RefreshToken, &self.refresh_token),
            (SessionKey::UserId, &self.user_id),
            (SessionKey::UserEmail, &self.email),
            (SessionKey::UserName, &self.display_name),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                store.set(key, value)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: Mutex<BTreeMap<SessionKey, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: SessionKey) -> Option<String> {
        self.values.lock().get(&key).cloned()
    }

    fn set(&self, key: SessionKey, value: &str) -> anyhow::Result<()> {
        self.values.lock().insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: SessionKey) -> anyhow::Result<()> {
        self.values.lock().remove(&key);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.values.lock().clear();
        Ok(())
    }
}

/// Session map persisted as a JSON object in the data directory.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSessionStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join("session.json");

        let values = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };

        info!(
            file = %path.display(),
            signed_in = values.contains_key(SessionKey::AccessToken.as_str()),
            "opened session store"
        );

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> anyhow::Result<()> {
        debug!(file = %self.path.display(), keys = values.len(), "saving session");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp, values)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: SessionKey) -> Option<String> {
        self.values.lock().get(key.as_str()).cloned()
    }

    fn set(&self, key: SessionKey, value: &str) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        values.insert(key.as_str().to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: SessionKey) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        if values.remove(key.as_str()).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut values = self.values.lock();
        for key in SessionKey::ALL {
            values.remove(key.as_str());
        }
        self.persist(&values)
    }
}
