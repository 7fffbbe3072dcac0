//! Keep an installed dependency in sync with its sources.
//!
//! One non-recursive watch per tracked top-level entry. A change to the
//! dependency's own package.json re-resolves its file set and installs or
//! removes the difference; other changes are copied (or relinked) one path
//! at a time. Removals are ignored so the installer's own deletions never
//! feed back into the loop.

use super::descriptor::InstallMode;
use super::files::{resolve_file_set, FileEntry, FileSet, FileSetDiff};
use super::installer::{InstalledSet, Installer};
use super::package::PackageNode;
use crate::error::{Error, Result};
use crate::paths::PACKAGE_JSON;
use notify::{
    event::{ModifyKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 50;

type SharedHandle = Arc<Mutex<Option<RecommendedWatcher>>>;

/// Watcher lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum WatchError {
    #[error("Watcher is already running")]
    AlreadyRunning,
    #[error("Watcher is not running")]
    NotRunning,
    #[error("Watcher has been stopped")]
    Stopped,
    #[error("Watcher failed: {0}")]
    WatcherFailed(String),
}

impl From<WatchError> for Error {
    fn from(e: WatchError) -> Self {
        Self::Watch(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Stopped,
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Update,
    Remove,
}

impl ChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Update),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Self::Remove),
            EventKind::Modify(_) => Some(Self::Update),
            EventKind::Remove(_) => Some(Self::Remove),
            _ => None,
        }
    }
}

/// The state a running watch operates on. Usable without a filesystem
/// watcher, which keeps the diff logic testable.
#[derive(Debug)]
pub struct WatchSession {
    dependency: PackageNode,
    installer: Installer,
    tracked: FileSet,
    installed: InstalledSet,
}

impl WatchSession {
    #[must_use]
    pub fn new(dependency: PackageNode, installer: Installer, installed: InstalledSet) -> Self {
        Self {
            dependency,
            installer,
            tracked: FileSet::new(),
            installed,
        }
    }

    #[must_use]
    pub fn tracked(&self) -> &FileSet {
        &self.tracked
    }

    #[must_use]
    pub fn installed(&self) -> &InstalledSet {
        &self.installed
    }

    fn manifest_path(&self) -> PathBuf {
        self.dependency.manifest.path()
    }

    /// Re-read the manifest and replace the tracked set without installing anything.
    pub async fn refresh(&mut self) -> Result<()> {
        self.dependency.manifest.read_json(true).await?;
        self.tracked = resolve_file_set(&self.dependency).await?;
        Ok(())
    }

    /// Re-resolve the file set and apply the difference to the install.
    pub async fn recheck_manifest(&mut self) -> Result<FileSetDiff> {
        self.dependency.manifest.read_json(true).await?;
        let next = resolve_file_set(&self.dependency).await?;
        let diff = self.tracked.diff(&next);

        if !diff.added.is_empty() {
            info!(
                package = %self.installer.dependency_name(),
                count = diff.added.len(),
                "new files detected"
            );
            let installed = self.installer.install_entries(&diff.added).await;
            for (file, reason) in installed.skipped() {
                warn!(source = %file.source.absolute_path.display(), reason, "could not install");
            }
            self.installed.extend(installed);
        }

        for entry in &diff.removed {
            match self.installer.remove_entry(entry).await {
                Ok(Some(destination)) => {
                    info!(path = %destination.display(), "deleted from install");
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(source = %entry.absolute_path.display(), error = %e, "failed to delete");
                }
            }
            self.installed.forget(&entry.absolute_path);
        }

        self.tracked = next;
        Ok(diff)
    }

    /// Apply one coalesced change. Returns the diff when the manifest was rechecked.
    pub async fn handle_change(
        &mut self,
        path: &Path,
        kind: ChangeKind,
    ) -> Result<Option<FileSetDiff>> {
        if path == self.manifest_path() {
            if kind == ChangeKind::Remove {
                warn!(path = %path.display(), "dependency package.json removed");
                return Ok(None);
            }
            if self.installer.mode() == InstallMode::Copy {
                let destination = self.installer.destination().join(PACKAGE_JSON);
                if let Err(e) = self.installer.copy_or_link(path, &destination).await {
                    warn!(path = %path.display(), error = %e, "failed to copy package.json");
                }
            }
            return self.recheck_manifest().await.map(Some);
        }

        if kind == ChangeKind::Remove {
            debug!(path = %path.display(), "removal ignored");
            return Ok(None);
        }

        let Some((entry, destination)) = self.mirror(path) else {
            debug!(path = %path.display(), "change outside the tracked entries");
            return Ok(None);
        };

        // A nested change already shows through a linked entry
        if self.installer.mode() == InstallMode::Link && entry.absolute_path != path {
            return Ok(None);
        }

        match self.installer.copy_or_link(path, &destination).await {
            Ok(()) => info!(
                path = %path.display(),
                destination = %destination.display(),
                mode = %self.installer.mode(),
                "synced"
            ),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to sync"),
        }
        Ok(None)
    }

    /// The tracked entry holding `path` and where `path` lands in the install.
    fn mirror(&self, path: &Path) -> Option<(FileEntry, PathBuf)> {
        let entry = self
            .tracked
            .iter()
            .filter(|e| path.starts_with(&e.absolute_path))
            .max_by_key(|e| e.absolute_path.components().count())?;
        let rest = path.strip_prefix(&entry.absolute_path).ok()?;
        let base = self.installer.destination_for(entry)?;
        let destination = if rest.as_os_str().is_empty() {
            base
        } else {
            base.join(rest)
        };
        Some((entry.clone(), destination))
    }
}

/// Filesystem watch over one installed dependency.
pub struct Watcher {
    state: WatchState,
    session: Arc<AsyncMutex<WatchSession>>,
    handle: SharedHandle,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    #[must_use]
    pub fn new(session: WatchSession) -> Self {
        Self {
            state: WatchState::Idle,
            session: Arc::new(AsyncMutex::new(session)),
            handle: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> WatchState {
        self.state
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.state == WatchState::Watching
    }

    /// Resolve the file set and attach the watches.
    ///
    /// Leaves the watcher idle when there is nothing to watch.
    pub async fn start(&mut self) -> Result<(), WatchError> {
        match self.state {
            WatchState::Watching => return Err(WatchError::AlreadyRunning),
            WatchState::Stopped => return Err(WatchError::Stopped),
            WatchState::Idle => {}
        }

        let entries: Vec<PathBuf> = {
            let mut session = self.session.lock().await;
            session
                .refresh()
                .await
                .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;
            if !session.tracked.has_payload() {
                debug!(package = %session.installer.dependency_name(), "nothing to watch");
                return Ok(());
            }
            session
                .tracked
                .iter()
                .map(|e| e.absolute_path.clone())
                .collect()
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<(PathBuf, ChangeKind)>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(kind) = ChangeKind::from_event(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        if let Err(e) = tx.send((path, kind)) {
                            warn!(error = %e, "Failed to send watch event");
                        }
                    }
                }
                Err(e) => error!(error = %e, "Watch error"),
            },
            Config::default(),
        )
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

        for path in &entries {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => debug!(path = %path.display(), "watching"),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot watch"),
            }
        }

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(watcher);

        let session = Arc::clone(&self.session);
        let handle = Arc::clone(&self.handle);
        self.task = Some(tokio::spawn(async move {
            process_events(&mut rx, &session, &handle).await;
        }));
        self.state = WatchState::Watching;
        Ok(())
    }

    /// Close the watch handle. Work triggered by the last events may still be running.
    pub fn stop(&mut self) -> Result<(), WatchError> {
        match self.state {
            WatchState::Idle => return Err(WatchError::NotRunning),
            WatchState::Stopped => return Err(WatchError::Stopped),
            WatchState::Watching => {}
        }

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state = WatchState::Stopped;
        info!("File watcher stopped");
        Ok(())
    }

    /// Wait for the event loop to drain after [`Watcher::stop`].
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "watch task failed");
            }
        }
    }
}

/// Drain events, coalescing bursts per path.
async fn process_events(
    rx: &mut mpsc::UnboundedReceiver<(PathBuf, ChangeKind)>,
    session: &AsyncMutex<WatchSession>,
    handle: &SharedHandle,
) {
    let window = Duration::from_millis(COALESCE_WINDOW_MS);
    let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();
    let mut last_event_time = Instant::now();

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some((path, kind))) => {
                pending.insert(path, kind);
                last_event_time = Instant::now();
            }
            Ok(None) => {
                debug!("Watch event channel closed");
                break;
            }
            Err(_) => {
                if pending.is_empty() || last_event_time.elapsed() < window {
                    continue;
                }
                debug!(count = pending.len(), "Processing coalesced file events");

                let mut session = session.lock().await;
                for (path, kind) in pending.drain() {
                    match session.handle_change(&path, kind).await {
                        Ok(Some(diff)) => update_watches(handle, &diff),
                        Ok(None) => {}
                        Err(e) => warn!(path = %path.display(), error = %e, "recheck failed"),
                    }
                }
            }
        }
    }
}

fn update_watches(handle: &SharedHandle, diff: &FileSetDiff) {
    let mut guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(watcher) = guard.as_mut() else {
        return;
    };

    for entry in &diff.removed {
        if let Err(e) = watcher.unwatch(&entry.absolute_path) {
            debug!(path = %entry.absolute_path.display(), error = %e, "unwatch failed");
        }
    }
    for entry in &diff.added {
        match watcher.watch(&entry.absolute_path, RecursiveMode::NonRecursive) {
            Ok(()) => debug!(path = %entry.absolute_path.display(), "watching"),
            Err(e) => warn!(path = %entry.absolute_path.display(), error = %e, "cannot watch"),
        }
    }
}
