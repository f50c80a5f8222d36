use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A saved connection profile
///
/// Field names in the stored file are camelCase (`keyPath`, `dbPath`) for
/// compatibility with existing `connections.json` files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConnection {
    pub id: String,
    pub name: String,
    pub host: String,
    pub user: String,
    pub key_path: String,
    pub db_path: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl SavedConnection {
    pub fn new(name: String, host: String, user: String, key_path: String, db_path: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            host,
            user,
            key_path,
            db_path,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Profile store backed by a JSON array on disk
///
/// Single-process, synchronous read-modify-write. The id is the primary
/// key; uniqueness within the list is enforced by the linear scan in
/// [`ProfileStore::save`].
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Open the store at the default location (`<config_dir>/connections.json`)
    pub fn open_default() -> AppResult<Self> {
        let config_dir = super::ensure_config_dir()?;
        Ok(Self {
            path: config_dir.join("connections.json"),
        })
    }

    /// Open the store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load all saved connections. A missing file is an empty list.
    pub fn load(&self) -> AppResult<Vec<SavedConnection>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let connections: Vec<SavedConnection> = serde_json::from_str(&content)?;
        Ok(connections)
    }

    /// Save a connection: replace the entry with the same id, else append
    pub fn save(&self, conn: SavedConnection) -> AppResult<()> {
        let mut connections = self.load()?;

        let mut conn = conn;
        conn.updated_at = chrono::Utc::now().timestamp();

        match connections.iter_mut().find(|c| c.id == conn.id) {
            Some(existing) => {
                conn.created_at = existing.created_at;
                *existing = conn;
            }
            None => connections.push(conn),
        }

        self.write(&connections)
    }

    /// Delete the connection with the given id
    pub fn delete(&self, id: &str) -> AppResult<()> {
        let mut connections = self.load()?;
        let before = connections.len();
        connections.retain(|c| c.id != id);

        if connections.len() == before {
            return Err(AppError::ProfileNotFound(id.to_string()));
        }

        self.write(&connections)
    }

    /// Get a connection by id
    pub fn get(&self, id: &str) -> AppResult<SavedConnection> {
        self.load()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::ProfileNotFound(id.to_string()))
    }

    /// Look up a connection by id first, then by name
    pub fn find(&self, name_or_id: &str) -> AppResult<SavedConnection> {
        let connections = self.load()?;
        connections
            .iter()
            .find(|c| c.id == name_or_id)
            .or_else(|| connections.iter().find(|c| c.name == name_or_id))
            .cloned()
            .ok_or_else(|| AppError::ProfileNotFound(name_or_id.to_string()))
    }

    fn write(&self, connections: &[SavedConnection]) -> AppResult<()> {
        let content = serde_json::to_string_pretty(connections)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
