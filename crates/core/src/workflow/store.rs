//! The workflow store: creation, lookup, persistence and run locks.
//!
//! The store keeps one [`WorkflowHandle`] per tracked workflow. A handle
//! owns the in-memory copy of the workflow and a run lock; every mutation
//! goes through [`WorkflowHandle::mutate`], which applies the change to a
//! copy, persists it, and only then swaps it in. Stage execution must hold a
//! [`RunGuard`], so at most one stage of a workflow runs at a time.

use crate::config::error::ConfigError;
use crate::config::models::ServiceConfig;
use crate::error::{OrchestratorError, OrchestratorResult, ResourceKind};
use crate::workflow::metadata::{self, Registry, METADATA_FILE};
use chrono::Utc;
use mdk_protocol::{StageName, StageState, StageStatus, Workflow, WorkflowTemplate};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Detail attached to stages found RUNNING with no process behind them.
pub const INTERRUPTED: &str = "interrupted";

/// Which captured stream of a stage attempt to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A tracked workflow: its state and its run lock.
#[derive(Debug)]
pub struct WorkflowHandle {
    id: Uuid,
    root_dir: PathBuf,
    state: Mutex<Workflow>,
    run_lock: Arc<Mutex<()>>,
}

impl WorkflowHandle {
    fn new(workflow: Workflow) -> Self {
        Self {
            id: workflow.id,
            root_dir: workflow.root_dir.clone(),
            state: Mutex::new(workflow),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// A copy of the current workflow state.
    pub async fn snapshot(&self) -> Workflow {
        self.state.lock().await.clone()
    }

    /// Applies `change` and persists the result atomically.
    ///
    /// The in-memory state is only replaced once the metadata file has been
    /// written, so memory and disk never disagree.
    pub async fn mutate<F>(&self, change: F) -> OrchestratorResult<Workflow>
    where
        F: FnOnce(&mut Workflow),
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        change(&mut next);
        next.updated_at = Utc::now();
        metadata::write_metadata(&next)?;
        *state = next.clone();
        Ok(next)
    }

    fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }
}

/// Exclusive right to run stages of one workflow.
///
/// Dropping the guard releases the lock.
pub struct RunGuard {
    handle: Arc<WorkflowHandle>,
    _lock: OwnedMutexGuard<()>,
}

impl Deref for RunGuard {
    type Target = WorkflowHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

/// Marks RUNNING stages with no live process as finished.
///
/// A RUNNING attempt that already has a completed record takes that record's
/// status; any other RUNNING stage becomes FAILED with detail `interrupted`.
/// Returns true if anything changed.
pub fn reconcile_interrupted(workflow: &mut Workflow) -> bool {
    let mut changed = false;

    for stage in StageName::ALL {
        let Some(state) = workflow.stage_status.get(&stage) else {
            continue;
        };
        if state.status != StageStatus::Running {
            continue;
        }

        let finished = state
            .attempt
            .and_then(|attempt| workflow.record_for(stage, attempt))
            .map(|record| StageState::from_record(record, None));

        let next = finished.unwrap_or_else(|| StageState {
            status: StageStatus::Failed,
            detail: Some(INTERRUPTED.to_string()),
            attempt: state.attempt,
        });
        workflow.stage_status.insert(stage, next);
        changed = true;
    }

    changed
}

/// Tracks workflows and owns their directories.
pub struct WorkflowStore {
    config: Arc<ServiceConfig>,
    workflows: RwLock<HashMap<Uuid, Arc<WorkflowHandle>>>,
    /// Serializes directory allocation and registry writes.
    allocation: Mutex<()>,
}

impl WorkflowStore {
    /// Creates an empty store. Call [`rehydrate`](Self::rehydrate) to load
    /// workflows persisted by earlier runs.
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self {
            config,
            workflows: RwLock::new(HashMap::new()),
            allocation: Mutex::new(()),
        }
    }

    /// Creates a store and loads every persisted workflow.
    pub async fn open(config: Arc<ServiceConfig>) -> OrchestratorResult<Self> {
        let store = Self::new(config);
        let count = store.rehydrate().await?;
        info!(count, root = %store.workspace_root().display(), "Workflow store ready");
        Ok(store)
    }

    pub fn config(&self) -> &Arc<ServiceConfig> {
        &self.config
    }

    fn workspace_root(&self) -> PathBuf {
        absolutize(&self.config.workspace_root())
    }

    /// Reloads workflows from the workspace root and the registry.
    ///
    /// Stages left RUNNING by a previous process are reconciled and the fix
    /// is written back. Unreadable metadata files are skipped with a warning.
    ///
    /// # Returns
    ///
    /// The number of workflows tracked afterwards.
    pub async fn rehydrate(&self) -> OrchestratorResult<usize> {
        let _allocation = self.allocation.lock().await;
        let root = self.workspace_root();
        let mut registry = Registry::load(&root)?;

        let mut candidates: Vec<PathBuf> = Vec::new();
        if root.is_dir() {
            let entries = std::fs::read_dir(&root).map_err(|e| OrchestratorError::io(&root, e))?;
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if path.join(METADATA_FILE).is_file() {
                    candidates.push(path);
                }
            }
        }
        candidates.extend(registry.workflows.values().cloned());

        let mut workflows = self.workflows.write().await;
        for dir in candidates {
            let mut workflow = match metadata::read_metadata(&dir) {
                Ok(workflow) => workflow,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Skipping unreadable workflow");
                    continue;
                }
            };
            if workflows.contains_key(&workflow.id) {
                continue;
            }
            // The directory may have moved since the metadata was written.
            workflow.root_dir = dir.canonicalize().unwrap_or(dir);

            if reconcile_interrupted(&mut workflow) {
                warn!(workflow_id = %workflow.id, "Marked interrupted stages as FAILED");
                workflow.updated_at = Utc::now();
                metadata::write_metadata(&workflow)?;
            }
            debug!(workflow_id = %workflow.id, "Rehydrated workflow");
            workflows.insert(workflow.id, Arc::new(WorkflowHandle::new(workflow)));
        }

        let before = registry.workflows.len();
        registry.workflows.retain(|id, _| workflows.contains_key(id));
        if registry.workflows.len() != before {
            registry.save(&root)?;
        }

        Ok(workflows.len())
    }

    /// Creates a workflow and claims its directory.
    ///
    /// # Arguments
    ///
    /// * `name` - Human-readable name, also used to derive the default directory
    /// * `requested_dir` - Directory to own instead of a fresh one under the workspace root
    /// * `description` - Optional free text
    ///
    /// # Errors
    ///
    /// * `DirectoryConflict` if the directory is owned by another workflow,
    ///   already holds workflow metadata, or is not empty
    /// * `PermissionError` if the directory cannot be created or written
    pub async fn create(
        &self,
        name: &str,
        requested_dir: Option<&Path>,
        description: Option<String>,
    ) -> OrchestratorResult<Workflow> {
        let template = WorkflowTemplate {
            name: name.to_string(),
            description,
            params: serde_json::Value::Object(serde_json::Map::new()),
        };
        self.create_from(template, requested_dir).await
    }

    async fn create_from(
        &self,
        template: WorkflowTemplate,
        requested_dir: Option<&Path>,
    ) -> OrchestratorResult<Workflow> {
        let _allocation = self.allocation.lock().await;
        let id = Uuid::new_v4();

        let (root_dir, external) = match requested_dir {
            Some(dir) => (self.claim_requested_dir(dir).await?, true),
            None => (self.allocate_default_dir(&template.name, id).await?, false),
        };

        let mut workflow = Workflow::new(id, template.name, root_dir.clone(), Utc::now());
        workflow.description = template.description;
        workflow.params = template.params;

        if let Err(err) = metadata::write_metadata(&workflow) {
            let _ = std::fs::remove_dir(&root_dir);
            return Err(err);
        }

        // Requested directories may sit anywhere, including nested below the
        // workspace root, so rehydration finds them through the registry.
        if external {
            let root = self.workspace_root();
            let mut registry = Registry::load(&root)?;
            registry.workflows.insert(id, root_dir.clone());
            std::fs::create_dir_all(&root).map_err(|e| permission(&root, e))?;
            registry.save(&root)?;
        }

        self.workflows
            .write()
            .await
            .insert(id, Arc::new(WorkflowHandle::new(workflow.clone())));

        info!(workflow_id = %id, dir = %root_dir.display(), "Created workflow");
        Ok(workflow)
    }

    async fn claim_requested_dir(&self, dir: &Path) -> OrchestratorResult<PathBuf> {
        let dir = absolutize(dir);
        self.ensure_outside_workspace_root(&dir)?;

        if dir.exists() {
            if !dir.is_dir() {
                return Err(conflict(&dir, "path exists and is not a directory"));
            }
            let dir = dir.canonicalize().map_err(|e| permission(&dir, e))?;
            self.ensure_outside_workspace_root(&dir)?;
            self.ensure_unowned(&dir).await?;
            if dir.join(METADATA_FILE).exists() {
                return Err(conflict(&dir, "directory already holds workflow metadata"));
            }
            let mut entries = std::fs::read_dir(&dir).map_err(|e| permission(&dir, e))?;
            if entries.next().is_some() {
                return Err(conflict(&dir, "directory is not empty"));
            }
            ensure_writable(&dir)?;
            return Ok(dir);
        }

        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| permission(parent, e))?;
        }
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(conflict(&dir, "directory was created concurrently"));
            }
            Err(e) => return Err(permission(&dir, e)),
        }
        let dir = dir.canonicalize().map_err(|e| permission(&dir, e))?;
        let claimed = match self.ensure_outside_workspace_root(&dir) {
            Ok(()) => self.ensure_unowned(&dir).await,
            Err(err) => Err(err),
        };
        if let Err(err) = claimed {
            let _ = std::fs::remove_dir(&dir);
            return Err(err);
        }
        ensure_writable(&dir)?;
        Ok(dir)
    }

    async fn allocate_default_dir(&self, name: &str, id: Uuid) -> OrchestratorResult<PathBuf> {
        let root = self.workspace_root();
        std::fs::create_dir_all(&root).map_err(|e| permission(&root, e))?;

        let slug = slugify(name);
        for candidate in [root.join(&slug), root.join(format!("{slug}-{id}"))] {
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    let dir = candidate.canonicalize().map_err(|e| permission(&candidate, e))?;
                    if let Err(err) = self.ensure_unowned(&dir).await {
                        debug!(dir = %dir.display(), error = %err, "Skipping owned candidate");
                        let _ = std::fs::remove_dir(&dir);
                        continue;
                    }
                    ensure_writable(&dir)?;
                    return Ok(dir);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(permission(&candidate, e)),
            }
        }

        Err(conflict(&root.join(slug), "no free directory name"))
    }

    /// Rejects `dir` if it is the workspace root or one of its ancestors.
    fn ensure_outside_workspace_root(&self, dir: &Path) -> OrchestratorResult<()> {
        let root = self.workspace_root();
        let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
        if root.starts_with(dir) || canonical.starts_with(dir) {
            return Err(conflict(dir, "directory contains the workspace root"));
        }
        Ok(())
    }

    /// Rejects `dir` if it overlaps the directory of a tracked workflow.
    async fn ensure_unowned(&self, dir: &Path) -> OrchestratorResult<()> {
        let workflows = self.workflows.read().await;
        if let Some(owner) = workflows
            .values()
            .find(|h| h.root_dir.starts_with(dir) || dir.starts_with(&h.root_dir))
        {
            return Err(conflict(dir, &format!("owned by workflow {}", owner.id)));
        }
        Ok(())
    }

    /// The handle of a tracked workflow.
    pub async fn handle(&self, id: Uuid) -> OrchestratorResult<Arc<WorkflowHandle>> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| OrchestratorError::workflow_not_found(id))
    }

    pub async fn get(&self, id: Uuid) -> OrchestratorResult<Workflow> {
        Ok(self.handle(id).await?.snapshot().await)
    }

    /// All tracked workflows, oldest first.
    pub async fn list(&self) -> Vec<Workflow> {
        let handles: Vec<_> = self.workflows.read().await.values().cloned().collect();
        let mut workflows = Vec::with_capacity(handles.len());
        for handle in handles {
            workflows.push(handle.snapshot().await);
        }
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        workflows
    }

    /// Writes the full metadata document of a workflow to `output_file`.
    ///
    /// # Returns
    ///
    /// The absolute path written.
    pub async fn export(&self, id: Uuid, output_file: &Path) -> OrchestratorResult<PathBuf> {
        let workflow = self.get(id).await?;
        let path = absolutize(output_file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OrchestratorError::io(parent, e))?;
        }

        let json = metadata::to_json_bytes(&path, &workflow)?;
        metadata::write_atomically(&path, &json)?;

        info!(workflow_id = %id, path = %path.display(), "Exported workflow");
        Ok(path)
    }

    /// Creates a new workflow from an exported document.
    ///
    /// Only the name, description and params are taken over. The directory
    /// is claimed exactly as [`create`](Self::create) would.
    ///
    /// # Errors
    ///
    /// * `NotFound` if `input_file` does not exist
    /// * `Config` if it is not a workflow document or its params are not an object
    /// * the errors of [`create`](Self::create)
    pub async fn import(
        &self,
        input_file: &Path,
        requested_dir: Option<&Path>,
    ) -> OrchestratorResult<Workflow> {
        let content = std::fs::read_to_string(input_file).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                OrchestratorError::NotFound {
                    kind: ResourceKind::File,
                    name: input_file.display().to_string(),
                }
            } else {
                OrchestratorError::io(input_file, source)
            }
        })?;
        let template: WorkflowTemplate =
            serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
                path: input_file.to_path_buf(),
                source,
            })?;

        if template.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                path: input_file.to_path_buf(),
                reason: "workflow name is empty".to_string(),
            }
            .into());
        }
        if !template.params.is_object() {
            return Err(ConfigError::InvalidConfig {
                path: input_file.to_path_buf(),
                reason: "params must be an object".to_string(),
            }
            .into());
        }

        let workflow = self.create_from(template, requested_dir).await?;
        info!(workflow_id = %workflow.id, source = %input_file.display(), "Imported workflow");
        Ok(workflow)
    }

    /// Renames a workflow or replaces its description.
    pub async fn update(
        &self,
        id: Uuid,
        name: Option<String>,
        description: Option<String>,
    ) -> OrchestratorResult<Workflow> {
        let handle = self.handle(id).await?;
        handle
            .mutate(|workflow| {
                if let Some(name) = name {
                    workflow.name = name;
                }
                if let Some(description) = description {
                    workflow.description = Some(description);
                }
            })
            .await
    }

    /// Stops tracking a workflow.
    ///
    /// With `purge_files` the whole directory is removed. Otherwise only the
    /// metadata file goes and the simulation files stay on disk.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` while a stage of the workflow is running.
    pub async fn delete(&self, id: Uuid, purge_files: bool) -> OrchestratorResult<()> {
        let guard = self.acquire(id).await?;
        let _allocation = self.allocation.lock().await;

        let root_dir = guard.root_dir().to_path_buf();
        if purge_files {
            std::fs::remove_dir_all(&root_dir).map_err(|e| OrchestratorError::io(&root_dir, e))?;
        } else {
            let path = metadata::metadata_path(&root_dir);
            std::fs::remove_file(&path).map_err(|e| OrchestratorError::io(&path, e))?;
        }

        self.workflows.write().await.remove(&id);

        let root = self.workspace_root();
        let mut registry = Registry::load(&root)?;
        if registry.workflows.remove(&id).is_some() {
            registry.save(&root)?;
        }

        info!(workflow_id = %id, purge_files, "Deleted workflow");
        Ok(())
    }

    /// Takes the run lock of a workflow without waiting.
    ///
    /// Stages still marked RUNNING once the lock is held have no process
    /// behind them and are reconciled before the guard is returned.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another operation holds the lock.
    pub async fn acquire(&self, id: Uuid) -> OrchestratorResult<RunGuard> {
        let handle = self.handle(id).await?;
        let lock = Arc::clone(&handle.run_lock)
            .try_lock_owned()
            .map_err(|_| OrchestratorError::Conflict {
                workflow_id: id,
                reason: "a stage is already running".to_string(),
            })?;

        let guard = RunGuard {
            handle,
            _lock: lock,
        };

        if guard.snapshot().await.running_stage().is_some() {
            warn!(workflow_id = %id, "Reconciling stage left RUNNING");
            guard
                .mutate(|workflow| {
                    reconcile_interrupted(workflow);
                })
                .await?;
        }

        Ok(guard)
    }

    /// Returns true while some operation holds the workflow's run lock.
    pub async fn is_busy(&self, id: Uuid) -> OrchestratorResult<bool> {
        Ok(self.handle(id).await?.is_running())
    }

    /// Reads a captured log of the latest attempt.
    ///
    /// With `stage` unset, the most recent record of any stage is used.
    pub async fn read_log(
        &self,
        id: Uuid,
        stage: Option<StageName>,
        stream: LogStream,
    ) -> OrchestratorResult<String> {
        let workflow = self.get(id).await?;
        let record = match stage {
            Some(stage) => workflow.latest_record(stage),
            None => workflow.records.last(),
        }
        .ok_or_else(|| OrchestratorError::NotFound {
            kind: ResourceKind::Record,
            name: stage.map(|s| s.to_string()).unwrap_or_else(|| id.to_string()),
        })?;

        let relative = match stream {
            LogStream::Stdout => &record.stdout_path,
            LogStream::Stderr => &record.stderr_path,
        };
        let path = workflow.root_dir.join(relative);
        std::fs::read_to_string(&path).map_err(|e| OrchestratorError::io(&path, e))
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn ensure_writable(dir: &Path) -> OrchestratorResult<()> {
    tempfile::NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| permission(dir, e))
}

fn conflict(path: &Path, reason: &str) -> OrchestratorError {
    OrchestratorError::DirectoryConflict {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn permission(path: &Path, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::PermissionError {
        path: path.to_path_buf(),
        source,
    }
}

/// Directory-safe form of a workflow name.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(48).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "workflow".to_string()
    } else {
        slug
    }
}
