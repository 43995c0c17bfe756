//! Storage of frozen versions and event bindings
//!
//! [`BoardStore`] is the seam to whatever persistence a host uses. The
//! [`MemoryBoardStore`] keeps everything in memory, optionally mirroring
//! frozen versions to a directory so they survive restarts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use board_engine::Version;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::event::Event;
use crate::versions::FrozenBoard;

/// Persistence for everything the service does not keep as a working copy
#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn save_version(&self, app_id: &str, board_id: &str, frozen: FrozenBoard) -> Result<()>;

    async fn load_version(
        &self,
        app_id: &str,
        board_id: &str,
        version: Version,
    ) -> Result<Option<FrozenBoard>>;

    /// Frozen versions of a board, ascending
    async fn list_versions(&self, app_id: &str, board_id: &str) -> Result<Vec<Version>>;

    async fn save_event(&self, app_id: &str, event: Event) -> Result<()>;

    async fn load_event(&self, app_id: &str, event_id: &str) -> Result<Option<Event>>;

    async fn delete_event(&self, app_id: &str, event_id: &str) -> Result<Option<Event>>;

    async fn list_events(&self, app_id: &str) -> Result<Vec<Event>>;
}

type BoardKey = (String, String);

/// In-memory store with optional file persistence for versions
///
/// # Example
///
/// ```ignore
/// let store = MemoryBoardStore::with_persistence(".boards/versions");
/// let count = store.load_from_disk().await?;
/// println!("Loaded {} frozen versions", count);
/// ```
#[derive(Debug, Default)]
pub struct MemoryBoardStore {
    versions: RwLock<HashMap<BoardKey, BTreeMap<Version, FrozenBoard>>>,
    events: RwLock<HashMap<BoardKey, Event>>,
    /// Optional directory for version persistence
    persist_path: Option<PathBuf>,
}

impl MemoryBoardStore {
    /// Create a new in-memory store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that mirrors frozen versions into the given directory.
    ///
    /// The directory will be created if it doesn't exist when saving.
    pub fn with_persistence(path: impl AsRef<Path>) -> Self {
        Self {
            persist_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    fn version_file(root: &Path, app_id: &str, board_id: &str, version: Version) -> PathBuf {
        root.join(app_id).join(board_id).join(format!(
            "{}.{}.{}.json",
            version.0, version.1, version.2
        ))
    }

    /// Load every persisted version from the persistence directory.
    ///
    /// Returns the number of versions loaded. Unreadable files are skipped.
    pub async fn load_from_disk(&self) -> Result<usize> {
        let Some(ref root) = self.persist_path else {
            return Ok(0);
        };
        if !root.exists() {
            return Ok(0);
        }

        let mut versions = self.versions.write().await;
        let mut count = 0;
        for app in std::fs::read_dir(root)? {
            let app = app?;
            if !app.path().is_dir() {
                continue;
            }
            let app_id = app.file_name().to_string_lossy().to_string();
            for board in std::fs::read_dir(app.path())? {
                let board = board?;
                if !board.path().is_dir() {
                    continue;
                }
                let board_id = board.file_name().to_string_lossy().to_string();
                for entry in std::fs::read_dir(board.path())? {
                    let file_path = entry?.path();
                    if file_path.extension().map_or(true, |e| e != "json") {
                        continue;
                    }
                    let content = std::fs::read_to_string(&file_path)?;
                    match serde_json::from_str::<FrozenBoard>(&content) {
                        Ok(frozen) => {
                            versions
                                .entry((app_id.clone(), board_id.clone()))
                                .or_default()
                                .insert(frozen.version, frozen);
                            count += 1;
                        }
                        Err(e) => {
                            log::warn!("Failed to parse frozen version from {:?}: {}", file_path, e);
                        }
                    }
                }
            }
        }
        log::info!("Loaded {} frozen board versions from {:?}", count, root);
        Ok(count)
    }

    fn save_to_disk(&self, app_id: &str, board_id: &str, frozen: &FrozenBoard) -> Result<()> {
        let Some(ref root) = self.persist_path else {
            return Ok(());
        };

        let file_path = Self::version_file(root, app_id, board_id, frozen.version);
        if let Some(dir) = file_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string(frozen).map_err(board_engine::BoardError::from)?;
        std::fs::write(&file_path, content)?;
        log::debug!("Saved frozen version to {:?}", file_path);
        Ok(())
    }
}

fn key(a: &str, b: &str) -> BoardKey {
    (a.to_string(), b.to_string())
}

#[async_trait]
impl BoardStore for MemoryBoardStore {
    async fn save_version(&self, app_id: &str, board_id: &str, frozen: FrozenBoard) -> Result<()> {
        self.save_to_disk(app_id, board_id, &frozen)?;
        self.versions
            .write()
            .await
            .entry(key(app_id, board_id))
            .or_default()
            .insert(frozen.version, frozen);
        Ok(())
    }

    async fn load_version(
        &self,
        app_id: &str,
        board_id: &str,
        version: Version,
    ) -> Result<Option<FrozenBoard>> {
        Ok(self
            .versions
            .read()
            .await
            .get(&key(app_id, board_id))
            .and_then(|versions| versions.get(&version))
            .cloned())
    }

    async fn list_versions(&self, app_id: &str, board_id: &str) -> Result<Vec<Version>> {
        Ok(self
            .versions
            .read()
            .await
            .get(&key(app_id, board_id))
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn save_event(&self, app_id: &str, event: Event) -> Result<()> {
        self.events
            .write()
            .await
            .insert(key(app_id, &event.id), event);
        Ok(())
    }

    async fn load_event(&self, app_id: &str, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().await.get(&key(app_id, event_id)).cloned())
    }

    async fn delete_event(&self, app_id: &str, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.write().await.remove(&key(app_id, event_id)))
    }

    async fn list_events(&self, app_id: &str) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .iter()
            .filter(|((app, _), _)| app == app_id)
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_engine::Board;

    fn frozen(version: Version) -> FrozenBoard {
        let mut board = Board::new("b1", "Board");
        board.version = version;
        FrozenBoard::freeze(&board, 3).unwrap()
    }

    #[test]
    fn test_versions_list_ascending() {
        let store = MemoryBoardStore::new();
        tokio_test::block_on(async {
            store.save_version("app", "b1", frozen((1, 0, 0))).await.unwrap();
            store.save_version("app", "b1", frozen((0, 2, 0))).await.unwrap();
            store.save_version("app", "b1", frozen((0, 10, 1))).await.unwrap();

            let versions = store.list_versions("app", "b1").await.unwrap();
            assert_eq!(versions, vec![(0, 2, 0), (0, 10, 1), (1, 0, 0)]);
            assert!(store.list_versions("app", "other").await.unwrap().is_empty());
        });
    }

    #[tokio::test]
    async fn test_persisted_versions_reload() {
        let dir = tempfile::tempdir().unwrap();

        let store = MemoryBoardStore::with_persistence(dir.path());
        store.save_version("app", "b1", frozen((0, 1, 0))).await.unwrap();
        store.save_version("app", "b1", frozen((0, 2, 0))).await.unwrap();

        let reloaded = MemoryBoardStore::with_persistence(dir.path());
        assert_eq!(reloaded.load_from_disk().await.unwrap(), 2);
        let version = reloaded
            .load_version("app", "b1", (0, 2, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(version.thaw().unwrap().version, (0, 2, 0));
    }

    #[tokio::test]
    async fn test_load_without_persistence_is_empty() {
        let store = MemoryBoardStore::new();
        assert_eq!(store.load_from_disk().await.unwrap(), 0);
    }
}
