//! In-process `WorkflowStorage` backend, optionally persisted to a JSON file.
//!
//! Each snapshot works on a private copy of the committed state. Commit
//! re-validates every staged box write against the live versions, then
//! swaps the new state in as a whole, so readers see all of a snapshot's
//! writes or none of them. When a file path is configured the new state is
//! written (temp file + rename) before it becomes visible.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use steriflow_core::{BoxAssignment, BoxCode, InstrumentBox, Profile, WorkflowLogEntry};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::traits::WorkflowStorage;

/// Everything the backend stores. This is also the on-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    boxes: BTreeMap<String, InstrumentBox>,
    #[serde(default)]
    log: Vec<WorkflowLogEntry>,
    #[serde(default)]
    assignments: BTreeMap<String, BoxAssignment>,
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

impl StoreState {
    fn active_box_with_code(&self, code: &BoxCode) -> Option<&InstrumentBox> {
        self.boxes.values().find(|b| b.active && &b.code == code)
    }

    fn code_taken_by_other(&self, code: &BoxCode, box_id: &str) -> bool {
        self.boxes
            .values()
            .any(|b| b.active && &b.code == code && b.id != box_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoxWrite {
    Inserted,
    /// Updated from the committed version the snapshot first read.
    Updated { base_version: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignmentWrite {
    Inserted,
    Updated,
}

/// Transaction handle for [`MemoryStorage`].
#[derive(Debug)]
pub struct MemorySnapshot {
    working: StoreState,
    box_writes: BTreeMap<String, BoxWrite>,
    assignment_writes: BTreeMap<String, AssignmentWrite>,
    profile_writes: BTreeSet<String>,
    appended: Vec<WorkflowLogEntry>,
}

/// In-memory `WorkflowStorage`, with optional JSON file persistence.
#[derive(Debug)]
pub struct MemoryStorage {
    committed: Mutex<StoreState>,
    next_sequence: AtomicU64,
    path: Option<PathBuf>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// A volatile, empty store.
    pub fn new() -> Self {
        Self {
            committed: Mutex::new(StoreState::default()),
            next_sequence: AtomicU64::new(1),
            path: None,
        }
    }

    /// Open a store persisted at `path`, creating it on first commit if the
    /// file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<StoreState>(&text).map_err(|e| {
                StorageError::Backend(format!("invalid store file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(StorageError::Backend(format!(
                    "failed to read store file {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let next_sequence = state.log.iter().map(|e| e.sequence).max().unwrap_or(0) + 1;
        tracing::debug!(
            path = %path.display(),
            boxes = state.boxes.len(),
            log_entries = state.log.len(),
            "opened store file"
        );
        Ok(Self {
            committed: Mutex::new(state),
            next_sequence: AtomicU64::new(next_sequence),
            path: Some(path),
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(path: &Path, state: &StoreState) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::Backend(format!("failed to serialize store: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Backend(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            StorageError::Backend(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            StorageError::Backend(format!("failed to replace {}: {}", path.display(), e))
        })
    }
}

fn box_not_found(key: &str) -> StorageError {
    StorageError::BoxNotFound {
        key: key.to_string(),
    }
}

fn assignment_not_found(assignment_id: &str) -> StorageError {
    StorageError::AssignmentNotFound {
        assignment_id: assignment_id.to_string(),
    }
}

#[async_trait]
impl WorkflowStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let working = self.committed.lock().await.clone();
        Ok(MemorySnapshot {
            working,
            box_writes: BTreeMap::new(),
            assignment_writes: BTreeMap::new(),
            profile_writes: BTreeSet::new(),
            appended: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot {
            mut working,
            box_writes,
            assignment_writes,
            profile_writes,
            appended,
        } = snapshot;

        let mut committed = self.committed.lock().await;

        // Validate every staged write against the live state first.
        for (box_id, write) in &box_writes {
            let staged = working
                .boxes
                .get(box_id)
                .ok_or_else(|| box_not_found(box_id))?;
            match write {
                BoxWrite::Inserted => {
                    if committed.boxes.contains_key(box_id) {
                        return Err(StorageError::AlreadyExists {
                            kind: "box",
                            id: box_id.clone(),
                        });
                    }
                }
                BoxWrite::Updated { base_version } => {
                    let live = committed
                        .boxes
                        .get(box_id)
                        .ok_or_else(|| box_not_found(box_id))?;
                    if live.version != *base_version {
                        tracing::warn!(
                            box_id = %box_id,
                            expected_version = base_version,
                            found_version = live.version,
                            "commit rejected: box changed since snapshot read"
                        );
                        return Err(StorageError::ConcurrentConflict {
                            box_id: box_id.clone(),
                            expected_version: *base_version,
                        });
                    }
                }
            }
            if staged.active && committed.code_taken_by_other(&staged.code, box_id) {
                return Err(StorageError::DuplicateBoxCode {
                    code: staged.code.to_string(),
                });
            }
        }
        for (assignment_id, write) in &assignment_writes {
            if *write == AssignmentWrite::Inserted
                && committed.assignments.contains_key(assignment_id)
            {
                return Err(StorageError::AlreadyExists {
                    kind: "assignment",
                    id: assignment_id.clone(),
                });
            }
        }

        let mut next = committed.clone();
        for box_id in box_writes.keys() {
            if let Some(record) = working.boxes.remove(box_id) {
                next.boxes.insert(box_id.clone(), record);
            }
        }
        for assignment_id in assignment_writes.keys() {
            if let Some(record) = working.assignments.remove(assignment_id) {
                next.assignments.insert(assignment_id.clone(), record);
            }
        }
        for actor_id in &profile_writes {
            if let Some(profile) = working.profiles.remove(actor_id) {
                next.profiles.insert(actor_id.clone(), profile);
            }
        }
        next.log.extend(appended);

        if let Some(path) = &self.path {
            Self::persist(path, &next).await?;
        }
        *committed = next;
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        // The working copy is simply dropped.
        Ok(())
    }

    async fn insert_box(
        &self,
        snapshot: &mut MemorySnapshot,
        record: InstrumentBox,
    ) -> Result<(), StorageError> {
        if snapshot.working.boxes.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                kind: "box",
                id: record.id,
            });
        }
        if record.active && snapshot.working.active_box_with_code(&record.code).is_some() {
            return Err(StorageError::DuplicateBoxCode {
                code: record.code.to_string(),
            });
        }
        snapshot
            .box_writes
            .insert(record.id.clone(), BoxWrite::Inserted);
        snapshot.working.boxes.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_box_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        box_id: &str,
    ) -> Result<InstrumentBox, StorageError> {
        snapshot
            .working
            .boxes
            .get(box_id)
            .cloned()
            .ok_or_else(|| box_not_found(box_id))
    }

    async fn get_box_by_code_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        code: &BoxCode,
    ) -> Result<InstrumentBox, StorageError> {
        snapshot
            .working
            .active_box_with_code(code)
            .cloned()
            .ok_or_else(|| box_not_found(code.as_str()))
    }

    async fn update_box(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &InstrumentBox,
        expected_version: u64,
    ) -> Result<u64, StorageError> {
        let conflict = || StorageError::ConcurrentConflict {
            box_id: record.id.clone(),
            expected_version,
        };

        let current = snapshot
            .working
            .boxes
            .get(&record.id)
            .ok_or_else(|| box_not_found(&record.id))?;
        if current.version != expected_version {
            return Err(conflict());
        }

        // A box this snapshot has not written yet must still be at the
        // expected version in the committed state; fail early if another
        // transaction already won the race.
        let write = match snapshot.box_writes.get(&record.id) {
            Some(existing) => *existing,
            None => {
                let committed = self.committed.lock().await;
                let live_version = committed.boxes.get(&record.id).map(|b| b.version);
                if live_version != Some(expected_version) {
                    return Err(conflict());
                }
                BoxWrite::Updated {
                    base_version: expected_version,
                }
            }
        };

        if record.active && snapshot.working.code_taken_by_other(&record.code, &record.id) {
            return Err(StorageError::DuplicateBoxCode {
                code: record.code.to_string(),
            });
        }

        let mut stored = record.clone();
        stored.version = expected_version + 1;
        snapshot.box_writes.insert(record.id.clone(), write);
        snapshot.working.boxes.insert(record.id.clone(), stored);
        Ok(expected_version + 1)
    }

    async fn append_log_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        mut entry: WorkflowLogEntry,
    ) -> Result<WorkflowLogEntry, StorageError> {
        if snapshot.working.log.iter().any(|e| e.id == entry.id) {
            return Err(StorageError::AlreadyExists {
                kind: "log entry",
                id: entry.id,
            });
        }
        entry.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        snapshot.working.log.push(entry.clone());
        snapshot.appended.push(entry.clone());
        Ok(entry)
    }

    async fn insert_assignment(
        &self,
        snapshot: &mut MemorySnapshot,
        record: BoxAssignment,
    ) -> Result<(), StorageError> {
        if snapshot.working.assignments.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists {
                kind: "assignment",
                id: record.id,
            });
        }
        snapshot
            .assignment_writes
            .insert(record.id.clone(), AssignmentWrite::Inserted);
        snapshot
            .working
            .assignments
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_assignment_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        assignment_id: &str,
    ) -> Result<BoxAssignment, StorageError> {
        snapshot
            .working
            .assignments
            .get(assignment_id)
            .cloned()
            .ok_or_else(|| assignment_not_found(assignment_id))
    }

    async fn find_open_assignment_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        box_id: &str,
    ) -> Result<Option<BoxAssignment>, StorageError> {
        Ok(snapshot
            .working
            .assignments
            .values()
            .filter(|a| a.box_id == box_id && a.status.is_open())
            .max_by_key(|a| a.requested_at)
            .cloned())
    }

    async fn update_assignment(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &BoxAssignment,
    ) -> Result<(), StorageError> {
        if !snapshot.working.assignments.contains_key(&record.id) {
            return Err(assignment_not_found(&record.id));
        }
        snapshot
            .assignment_writes
            .entry(record.id.clone())
            .or_insert(AssignmentWrite::Updated);
        snapshot
            .working
            .assignments
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_profile(
        &self,
        snapshot: &mut MemorySnapshot,
        profile: Profile,
    ) -> Result<(), StorageError> {
        snapshot.profile_writes.insert(profile.actor_id.clone());
        snapshot
            .working
            .profiles
            .insert(profile.actor_id.clone(), profile);
        Ok(())
    }

    async fn get_box(&self, box_id: &str) -> Result<InstrumentBox, StorageError> {
        self.committed
            .lock()
            .await
            .boxes
            .get(box_id)
            .cloned()
            .ok_or_else(|| box_not_found(box_id))
    }

    async fn get_box_by_code(&self, code: &BoxCode) -> Result<InstrumentBox, StorageError> {
        self.committed
            .lock()
            .await
            .active_box_with_code(code)
            .cloned()
            .ok_or_else(|| box_not_found(code.as_str()))
    }

    async fn list_boxes(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<InstrumentBox>, StorageError> {
        let state = self.committed.lock().await;
        let mut boxes: Vec<InstrumentBox> = state
            .boxes
            .values()
            .filter(|b| include_inactive || b.active)
            .cloned()
            .collect();
        boxes.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.id.cmp(&b.id)));
        Ok(boxes)
    }

    async fn list_log_entries(
        &self,
        box_id: &str,
        limit: usize,
    ) -> Result<Vec<WorkflowLogEntry>, StorageError> {
        let state = self.committed.lock().await;
        let mut entries: Vec<WorkflowLogEntry> = state
            .log
            .iter()
            .filter(|e| e.box_id == box_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        if limit > 0 {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn get_assignment(&self, assignment_id: &str) -> Result<BoxAssignment, StorageError> {
        self.committed
            .lock()
            .await
            .assignments
            .get(assignment_id)
            .cloned()
            .ok_or_else(|| assignment_not_found(assignment_id))
    }

    async fn list_assignments(&self, box_id: &str) -> Result<Vec<BoxAssignment>, StorageError> {
        let state = self.committed.lock().await;
        let mut assignments: Vec<BoxAssignment> = state
            .assignments
            .values()
            .filter(|a| a.box_id == box_id)
            .cloned()
            .collect();
        assignments.sort_by(|a, b| {
            a.requested_at
                .cmp(&b.requested_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(assignments)
    }

    async fn get_profiles(&self, actor_ids: &[String]) -> Result<Vec<Profile>, StorageError> {
        let state = self.committed.lock().await;
        Ok(actor_ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| state.profiles.get(id).cloned())
            .collect())
    }
}
