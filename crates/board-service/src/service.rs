//! Board service
//!
//! Keeps one working copy per `(app_id, board_id)` behind its own mutex. A
//! command batch, an undo/redo and a version freeze each hold that mutex for
//! their whole duration, so none of them can observe a half-applied batch.
//! Different boards never share a lock beyond the registry map.

use std::collections::HashMap;
use std::sync::Arc;

use board_engine::{
    execute_batch, redo_batch, undo_batch, validate_board, Board, BoardError, Command,
    CommandHistory, EngineEvent, EntityKind, EventSink, NullEventSink, Version, VersionType,
};
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::event::Event;
use crate::store::{BoardStore, MemoryBoardStore};
use crate::versions::FrozenBoard;

type BoardKey = (String, String);

/// Working copy of a board plus its server-side history
struct BoardSlot {
    board: Board,
    history: CommandHistory,
}

/// Async facade over the board engine
pub struct BoardService {
    boards: RwLock<HashMap<BoardKey, Arc<Mutex<BoardSlot>>>>,
    store: Arc<dyn BoardStore>,
    events: Arc<dyn EventSink>,
    config: ServiceConfig,
}

impl BoardService {
    /// Create a service backed by an in-memory store
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            store: Arc::new(MemoryBoardStore::new()),
            events: Arc::new(NullEventSink),
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn BoardStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to send board event: {}", e);
        }
    }

    async fn slot(&self, app_id: &str, board_id: &str) -> Result<Arc<Mutex<BoardSlot>>> {
        self.boards
            .read()
            .await
            .get(&(app_id.to_string(), board_id.to_string()))
            .cloned()
            .ok_or_else(|| ServiceError::board_not_found(app_id, board_id))
    }

    async fn has_board(&self, app_id: &str, board_id: &str) -> bool {
        self.boards
            .read()
            .await
            .contains_key(&(app_id.to_string(), board_id.to_string()))
    }

    /// Register a working copy
    pub async fn create_board(&self, app_id: &str, board: Board) -> Result<()> {
        let key = (app_id.to_string(), board.id.clone());
        let mut boards = self.boards.write().await;
        if boards.contains_key(&key) {
            return Err(BoardError::conflict(EntityKind::Board, board.id).into());
        }
        log::debug!("Registered board '{}' in app '{}'", board.id, app_id);
        boards.insert(
            key,
            Arc::new(Mutex::new(BoardSlot {
                board,
                history: CommandHistory::new(self.config.history_limit),
            })),
        );
        Ok(())
    }

    /// Drop a working copy. Frozen versions stay in the store.
    pub async fn remove_board(&self, app_id: &str, board_id: &str) -> Result<Board> {
        let slot = self
            .boards
            .write()
            .await
            .remove(&(app_id.to_string(), board_id.to_string()))
            .ok_or_else(|| ServiceError::board_not_found(app_id, board_id))?;
        let slot = slot.lock().await;
        Ok(slot.board.clone())
    }

    pub async fn board_count(&self) -> usize {
        self.boards.read().await.len()
    }

    /// The working copy, or a fresh decode of a frozen version
    pub async fn get_board(
        &self,
        app_id: &str,
        board_id: &str,
        version: Option<Version>,
    ) -> Result<Board> {
        let Some(version) = version else {
            let slot = self.slot(app_id, board_id).await?;
            let slot = slot.lock().await;
            return Ok(slot.board.clone());
        };

        if let Some(frozen) = self.store.load_version(app_id, board_id, version).await? {
            return Ok(frozen.thaw()?);
        }
        if self.has_board(app_id, board_id).await {
            Err(ServiceError::VersionNotFound {
                board_id: board_id.to_string(),
                version,
            })
        } else {
            Err(ServiceError::board_not_found(app_id, board_id))
        }
    }

    /// Apply one command and return it with its recorded pre-images
    pub async fn execute_command(
        &self,
        app_id: &str,
        board_id: &str,
        command: Command,
    ) -> Result<Command> {
        self.execute_commands(app_id, board_id, vec![command])
            .await?
            .pop()
            .ok_or_else(|| BoardError::invariant("applied batch is empty").into())
    }

    /// Apply a batch all-or-nothing and return the enriched commands
    pub async fn execute_commands(
        &self,
        app_id: &str,
        board_id: &str,
        commands: Vec<Command>,
    ) -> Result<Vec<Command>> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;
        let BoardSlot { board, history } = &mut *guard;

        let applied = match execute_batch(board, commands) {
            Ok(applied) => applied,
            Err(e) => {
                self.emit(EngineEvent::BatchRolledBack {
                    board_id: board_id.to_string(),
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        if self.config.validate_after_batch {
            let findings = validate_board(board);
            if !findings.is_empty() {
                let message = findings
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                log::warn!(
                    "Rolling back batch on board '{}' after validation: {}",
                    board_id,
                    message
                );
                undo_batch(board, &applied)?;
                self.emit(EngineEvent::BatchRolledBack {
                    board_id: board_id.to_string(),
                    error: message.clone(),
                });
                return Err(BoardError::invariant(message).into());
            }
        }

        board.updated_at = Utc::now();
        history.push(applied.clone());
        self.emit(EngineEvent::batch_applied(board_id, &applied));
        Ok(applied)
    }

    /// Undo a client-held batch and return the new working copy
    ///
    /// The server-side history is cleared, since its entries no longer
    /// describe the working copy's past.
    pub async fn undo_board(
        &self,
        app_id: &str,
        board_id: &str,
        commands: &[Command],
    ) -> Result<Board> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;
        let BoardSlot { board, history } = &mut *guard;

        undo_batch(board, commands)?;
        board.updated_at = Utc::now();
        history.clear();
        self.emit(EngineEvent::BatchUndone {
            board_id: board_id.to_string(),
            count: commands.len(),
        });
        Ok(board.clone())
    }

    /// Re-apply a client-held batch and return the new working copy
    pub async fn redo_board(
        &self,
        app_id: &str,
        board_id: &str,
        commands: Vec<Command>,
    ) -> Result<Board> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;
        let BoardSlot { board, history } = &mut *guard;

        let count = commands.len();
        redo_batch(board, commands)?;
        board.updated_at = Utc::now();
        history.clear();
        self.emit(EngineEvent::BatchRedone {
            board_id: board_id.to_string(),
            count,
        });
        Ok(board.clone())
    }

    /// Undo the most recent batch applied through this service
    pub async fn undo_last(&self, app_id: &str, board_id: &str) -> Result<bool> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;
        let BoardSlot { board, history } = &mut *guard;

        let undone = history.undo(board)?;
        if undone {
            board.updated_at = Utc::now();
            self.emit(EngineEvent::BatchUndone {
                board_id: board_id.to_string(),
                count: 1,
            });
        }
        Ok(undone)
    }

    /// Redo the most recently undone batch
    pub async fn redo_last(&self, app_id: &str, board_id: &str) -> Result<bool> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;
        let BoardSlot { board, history } = &mut *guard;

        let redone = history.redo(board)?;
        if redone {
            board.updated_at = Utc::now();
            self.emit(EngineEvent::BatchRedone {
                board_id: board_id.to_string(),
                count: 1,
            });
        }
        Ok(redone)
    }

    /// Freeze the working copy under its next version
    pub async fn create_board_version(
        &self,
        app_id: &str,
        board_id: &str,
        version_type: VersionType,
    ) -> Result<Version> {
        let slot = self.slot(app_id, board_id).await?;
        let mut guard = slot.lock().await;

        if let Some(max) = self.config.max_versions_per_board {
            let existing = self.store.list_versions(app_id, board_id).await?.len();
            if existing >= max {
                return Err(ServiceError::Config(format!(
                    "board '{}' already has {} versions (maximum {})",
                    board_id, existing, max
                )));
            }
        }

        let next = version_type.bump(guard.board.version);
        let mut snapshot = guard.board.clone();
        snapshot.version = next;
        let frozen = FrozenBoard::freeze(&snapshot, self.config.snapshot_compression_level)?;
        let size = frozen.compressed_size();
        self.store.save_version(app_id, board_id, frozen).await?;
        guard.board.version = next;

        log::info!(
            "Created version {:?} of board '{}' ({} bytes)",
            next,
            board_id,
            size
        );
        self.emit(EngineEvent::VersionCreated {
            board_id: board_id.to_string(),
            version: next,
        });
        Ok(next)
    }

    /// Frozen versions, ascending
    pub async fn get_board_versions(&self, app_id: &str, board_id: &str) -> Result<Vec<Version>> {
        let versions = self.store.list_versions(app_id, board_id).await?;
        if versions.is_empty() && !self.has_board(app_id, board_id).await {
            return Err(ServiceError::board_not_found(app_id, board_id));
        }
        Ok(versions)
    }

    /// Create or update an event binding
    ///
    /// Active bindings must point at an existing node of the board (or the
    /// bound version) and may only override exposed, editable variables of
    /// the same shape.
    pub async fn upsert_event(
        &self,
        app_id: &str,
        mut event: Event,
        version_type: Option<VersionType>,
    ) -> Result<Event> {
        if event.id.is_empty() {
            event.id = uuid::Uuid::new_v4().to_string();
        }

        if event.active {
            let board = self
                .get_board(app_id, &event.board_id, event.board_version)
                .await
                .map_err(|e| ServiceError::InvalidEvent(e.to_string()))?;
            event
                .check_against(&board)
                .map_err(ServiceError::InvalidEvent)?;
        }

        let now = Utc::now();
        match self.store.load_event(app_id, &event.id).await? {
            Some(previous) => {
                event.created_at = previous.created_at;
                event.event_version = if event.retargets(&previous) || version_type.is_some() {
                    version_type
                        .unwrap_or(VersionType::Patch)
                        .bump(previous.event_version)
                } else {
                    previous.event_version
                };
            }
            None => {
                event.created_at = now;
                event.event_version = (0, 0, 0);
            }
        }
        event.updated_at = now;

        log::debug!(
            "Upserted event '{}' at {:?} for board '{}'",
            event.id,
            event.event_version,
            event.board_id
        );
        self.store.save_event(app_id, event.clone()).await?;
        Ok(event)
    }

    pub async fn get_event(&self, app_id: &str, event_id: &str) -> Result<Event> {
        self.store
            .load_event(app_id, event_id)
            .await?
            .ok_or_else(|| ServiceError::EventNotFound(event_id.to_string()))
    }

    pub async fn remove_event(&self, app_id: &str, event_id: &str) -> Result<Event> {
        self.store
            .delete_event(app_id, event_id)
            .await?
            .ok_or_else(|| ServiceError::EventNotFound(event_id.to_string()))
    }

    pub async fn list_events(&self, app_id: &str) -> Result<Vec<Event>> {
        self.store.list_events(app_id).await
    }
}

impl Default for BoardService {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_engine::{BoardBuilder, Node, Pin, Variable, VariableType, VecEventSink};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn board() -> Board {
        BoardBuilder::new("b1")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Integer)))
            .node(Node::new("n3", "print").with_pin(Pin::input("p3", "text", VariableType::String)))
            .variable(Variable::new("v1", "limit", VariableType::Integer).exposed_and_editable())
            .build()
    }

    async fn service_with_sink() -> (BoardService, Arc<VecEventSink>) {
        init_logging();
        let sink = Arc::new(VecEventSink::new());
        let service = BoardService::default().with_event_sink(sink.clone());
        service.create_board("app", board()).await.unwrap();
        (service, sink)
    }

    #[tokio::test]
    async fn test_connect_then_remove_node() {
        let (service, _) = service_with_sink().await;

        service
            .execute_command("app", "b1", Command::connect("n1", "p1", "n2", "p2"))
            .await
            .unwrap();
        let removed = service
            .execute_command("app", "b1", Command::remove_node("n2"))
            .await
            .unwrap();

        let board = service.get_board("app", "b1", None).await.unwrap();
        assert!(!board.nodes.contains_key("n2"));
        assert!(board.nodes["n1"].pins["p1"].connected_to.is_empty());

        let restored = service
            .undo_board("app", "b1", std::slice::from_ref(&removed))
            .await
            .unwrap();
        assert!(restored.nodes["n1"].pins["p1"].connected_to.contains("p2"));
        assert!(restored.nodes["n2"].pins["p2"].connected_to.contains("p1"));
    }

    #[tokio::test]
    async fn test_stale_client_undo_is_refused() {
        let (service, _) = service_with_sink().await;
        let fanout = BoardBuilder::new("b2")
            .node(Node::new("n1", "const").with_pin(Pin::output("p1", "out", VariableType::Integer)))
            .node(Node::new("n2", "log").with_pin(Pin::input("p2", "in", VariableType::Integer)))
            .node(Node::new("n4", "log").with_pin(Pin::input("p4", "in", VariableType::Integer)))
            .build();
        service.create_board("app", fanout).await.unwrap();

        let first = service
            .execute_command("app", "b2", Command::connect("n1", "p1", "n2", "p2"))
            .await
            .unwrap();
        let second = service
            .execute_command("app", "b2", Command::connect("n1", "p1", "n4", "p4"))
            .await
            .unwrap();
        let both = service.get_board("app", "b2", None).await.unwrap();

        let result = service
            .undo_board("app", "b2", std::slice::from_ref(&first))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Engine(BoardError::InvariantViolation(_)))
        ));
        let after = service.get_board("app", "b2", None).await.unwrap();
        assert_eq!(after.nodes, both.nodes);
        assert!(service.undo_last("app", "b2").await.unwrap());

        let restored = service
            .undo_board("app", "b2", std::slice::from_ref(&first))
            .await
            .unwrap();
        assert!(restored.nodes["n1"].pins["p1"].connected_to.is_empty());
        assert!(restored.nodes["n2"].pins["p2"].connected_to.is_empty());
        assert!(validate_board(&restored).is_empty());

        let redone = service.redo_board("app", "b2", vec![first]).await.unwrap();
        assert!(redone.nodes["n2"].pins["p2"].connected_to.contains("p1"));
        assert!(redone.nodes["n4"].pins["p4"].connected_to.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back_and_reports() {
        let (service, sink) = service_with_sink().await;
        let before = service.get_board("app", "b1", None).await.unwrap();

        let result = service
            .execute_commands(
                "app",
                "b1",
                vec![
                    Command::connect("n1", "p1", "n2", "p2"),
                    Command::connect("n1", "p1", "n3", "p3"),
                ],
            )
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Engine(BoardError::TypeMismatch { .. }))
        ));

        let after = service.get_board("app", "b1", None).await.unwrap();
        assert_eq!(after.nodes, before.nodes);
        assert!(matches!(
            sink.events().last(),
            Some(EngineEvent::BatchRolledBack { .. })
        ));
    }

    #[tokio::test]
    async fn test_versions_are_immutable() {
        let (service, sink) = service_with_sink().await;

        let v1 = service
            .create_board_version("app", "b1", VersionType::Minor)
            .await
            .unwrap();
        assert_eq!(v1, (0, 1, 0));

        service
            .execute_command("app", "b1", Command::remove_node("n3"))
            .await
            .unwrap();

        let frozen = service.get_board("app", "b1", Some(v1)).await.unwrap();
        assert!(frozen.nodes.contains_key("n3"));
        assert_eq!(frozen.version, v1);

        let working = service.get_board("app", "b1", None).await.unwrap();
        assert!(!working.nodes.contains_key("n3"));
        assert_eq!(working.version, v1);

        let v2 = service
            .create_board_version("app", "b1", VersionType::Major)
            .await
            .unwrap();
        assert_eq!(v2, (1, 0, 0));
        assert_eq!(
            service.get_board_versions("app", "b1").await.unwrap(),
            vec![v1, v2]
        );
        assert!(matches!(
            sink.events().last(),
            Some(EngineEvent::VersionCreated { version: (1, 0, 0), .. })
        ));

        assert!(matches!(
            service.get_board("app", "b1", Some((9, 9, 9))).await,
            Err(ServiceError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_versions() {
        init_logging();
        let config = ServiceConfig {
            max_versions_per_board: Some(1),
            ..ServiceConfig::default()
        };
        let service = BoardService::new(config);
        service.create_board("app", board()).await.unwrap();

        service
            .create_board_version("app", "b1", VersionType::Patch)
            .await
            .unwrap();
        assert!(matches!(
            service
                .create_board_version("app", "b1", VersionType::Patch)
                .await,
            Err(ServiceError::Config(_))
        ));
        let working = service.get_board("app", "b1", None).await.unwrap();
        assert_eq!(working.version, (0, 0, 1));
    }

    #[tokio::test]
    async fn test_server_side_undo_redo() {
        let (service, _) = service_with_sink().await;
        assert!(!service.undo_last("app", "b1").await.unwrap());

        service
            .execute_command("app", "b1", Command::connect("n1", "p1", "n2", "p2"))
            .await
            .unwrap();

        assert!(service.undo_last("app", "b1").await.unwrap());
        let board = service.get_board("app", "b1", None).await.unwrap();
        assert!(board.nodes["n1"].pins["p1"].connected_to.is_empty());

        assert!(service.redo_last("app", "b1").await.unwrap());
        let board = service.get_board("app", "b1", None).await.unwrap();
        assert!(board.nodes["n1"].pins["p1"].connected_to.contains("p2"));
        assert!(!service.redo_last("app", "b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_event_validation_and_versioning() {
        let (service, _) = service_with_sink().await;

        let invalid = Event::new("Tick", "b1", "missing", "cron").activated();
        assert!(matches!(
            service.upsert_event("app", invalid, None).await,
            Err(ServiceError::InvalidEvent(_))
        ));

        let event = Event::new("Tick", "b1", "n1", "cron")
            .with_override(Variable::new("v1", "limit", VariableType::Integer))
            .activated();
        let created = service.upsert_event("app", event, None).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.event_version, (0, 0, 0));

        // Same target, no version type: no bump
        let mut renamed = created.clone();
        renamed.name = "Every minute".to_string();
        let renamed = service.upsert_event("app", renamed, None).await.unwrap();
        assert_eq!(renamed.event_version, (0, 0, 0));

        let mut moved = renamed.clone();
        moved.node_id = "n2".to_string();
        let moved = service.upsert_event("app", moved, None).await.unwrap();
        assert_eq!(moved.event_version, (0, 0, 1));

        let bumped = service
            .upsert_event("app", moved, Some(VersionType::Minor))
            .await
            .unwrap();
        assert_eq!(bumped.event_version, (0, 1, 0));

        assert_eq!(service.list_events("app").await.unwrap().len(), 1);
        service.remove_event("app", &bumped.id).await.unwrap();
        assert!(matches!(
            service.get_event("app", &bumped.id).await,
            Err(ServiceError::EventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_boards() {
        init_logging();
        let service = BoardService::default();
        assert!(matches!(
            service.get_board("app", "nope", None).await,
            Err(ServiceError::BoardNotFound { .. })
        ));
        assert!(matches!(
            service.get_board_versions("app", "nope").await,
            Err(ServiceError::BoardNotFound { .. })
        ));

        service.create_board("app", board()).await.unwrap();
        assert!(matches!(
            service.create_board("app", board()).await,
            Err(ServiceError::Engine(BoardError::Conflict { .. }))
        ));
        // Same id under another app is a different board
        service.create_board("other", board()).await.unwrap();
        assert_eq!(service.board_count().await, 2);
    }
}
