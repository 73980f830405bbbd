//! Session registry
//!
//! Owns every PTY session, the tab/pane layout they are arranged in and the
//! event channel their reader threads report into.
//!
//! Locking: the session map is held only for lookups and edits, the layout
//! only for tree edits. Spawning, killing, writing and resizing happen with
//! neither lock held, so a slow session never blocks the others.

mod error;
mod options;

pub use error::{RegistryError, RestoreReport, RestoreWarning};
pub use options::{PaneSpec, RegistryOptions, TabLayout};

use crate::layout::{
    LayoutArena, Pane, PaneId, PaneRemoval, PaneState, SplitDirection, Tab, TabId,
};
use crate::session::capture::{TabSnapshot, capture_session};
use crate::session::restore::plan_pane;
use crate::session::{SerializedState, SerializedTab};
use blockterm_config::Config;
use blockterm_terminal::{
    EventReceiver, EventSender, ExitReason, PtySession, SessionEvent, SessionId, SpawnError,
    SpawnOptions, event_channel,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

pub struct SessionRegistry {
    options: RegistryOptions,
    sessions: RwLock<HashMap<SessionId, Arc<PtySession>>>,
    /// Exit reasons of sessions still in the map
    exits: Mutex<HashMap<SessionId, ExitReason>>,
    layout: Mutex<LayoutArena>,
    events_tx: EventSender,
    events_rx: tokio::sync::Mutex<EventReceiver>,
}

impl SessionRegistry {
    pub fn new(options: RegistryOptions) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            options,
            sessions: RwLock::new(HashMap::new()),
            exits: Mutex::new(HashMap::new()),
            layout: Mutex::new(LayoutArena::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        Ok(Self::new(RegistryOptions::from_config(config)?))
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Start a session outside any tab.
    pub fn spawn(&self, options: SpawnOptions) -> Result<SessionId, RegistryError> {
        Ok(self.start_session(options)?)
    }

    fn start_session(&self, options: SpawnOptions) -> Result<SessionId, SpawnError> {
        let session = PtySession::spawn(options, self.events_tx.clone())?;
        let id = session.id();
        self.sessions.write().insert(id, Arc::new(session));
        Ok(id)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<PtySession>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Ids of every session in the registry, exited ones included.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_alive(&self, id: SessionId) -> bool {
        self.session(id).is_some_and(|s| s.is_alive())
    }

    /// Why a session ended, once its exit event has been drained.
    pub fn exit_reason(&self, id: SessionId) -> Option<ExitReason> {
        self.exits.lock().get(&id).cloned()
    }

    /// Send input to a session. Unknown ids are ignored.
    pub fn write(&self, id: SessionId, data: &[u8]) -> io::Result<()> {
        match self.session(id) {
            Some(session) => session.write(data),
            None => {
                log::debug!("Dropping {} bytes for unknown {}", data.len(), id);
                Ok(())
            }
        }
    }

    /// Resize a session's PTY. Unknown ids are ignored.
    pub fn resize(&self, id: SessionId, cols: u16, rows: u16) -> io::Result<()> {
        let Some(session) = self.session(id) else {
            return Ok(());
        };
        session.resize(cols, rows)?;
        let (cols, rows) = session.dimensions();
        let mut layout = self.layout.lock();
        if let Some(pane) = layout.pane_for_session(id)
            && let Some(pane) = layout.pane_mut(pane)
        {
            pane.state.cols = cols;
            pane.state.rows = rows;
        }
        Ok(())
    }

    /// Kill a session. It stays in the registry (and its pane keeps showing
    /// its scrollback) until the pane is closed. Unknown ids are ignored.
    pub fn kill(&self, id: SessionId) {
        if let Some(session) = self.session(id) {
            session.kill();
        }
    }

    /// Kill a session started with [`spawn`](Self::spawn) and drop it from
    /// the registry, releasing its scrollback and blocks. Sessions shown in
    /// a pane belong to the layout and are closed with
    /// [`close_pane`](Self::close_pane); for those, and for unknown ids,
    /// this does nothing and returns `false`.
    pub fn close_session(&self, id: SessionId) -> bool {
        if self.layout.lock().pane_for_session(id).is_some() {
            log::debug!("{} belongs to a pane, not closing it", id);
            return false;
        }
        if !self.sessions.read().contains_key(&id) {
            return false;
        }
        self.discard(&[id]);
        true
    }

    /// Remove sessions from the map and kill them.
    fn discard(&self, ids: &[SessionId]) {
        let sessions: Vec<Arc<PtySession>> = {
            let mut map = self.sessions.write();
            ids.iter().filter_map(|id| map.remove(id)).collect()
        };
        {
            let mut exits = self.exits.lock();
            for id in ids {
                exits.remove(id);
            }
        }
        kill_all(&sessions);
    }

    fn spawn_options(&self, state: &PaneState) -> SpawnOptions {
        let mut options = SpawnOptions::new(state.shell.clone())
            .args(state.args.iter().cloned())
            .size(state.cols, state.rows)
            .scrollback_bytes(self.options.scrollback_bytes)
            .max_blocks(self.options.max_blocks)
            .kill_grace(self.options.kill_grace)
            .history(state.history.clone());
        options.env = self.options.env.clone();
        if let Some(cwd) = &state.cwd {
            options = options.working_dir(cwd);
        }
        match &self.options.shell_integration {
            Some(hooks) => hooks.apply(options.clone()).unwrap_or_else(|e| {
                log::warn!(
                    "Shell integration unavailable in {}: {}",
                    hooks.dir().display(),
                    e
                );
                options
            }),
            None => options,
        }
    }

    fn pane_state(&self, spec: PaneSpec, inherited_cwd: Option<&String>) -> PaneState {
        let cwd = spec
            .cwd
            .map(|dir| dir.display().to_string())
            .or_else(|| inherited_cwd.cloned())
            .or_else(|| {
                self.options
                    .working_directory
                    .as_ref()
                    .map(|dir| dir.display().to_string())
            });
        let (cols, rows) = spec.size.unwrap_or((self.options.cols, self.options.rows));
        let (shell, args) = match spec.shell {
            Some(shell) => (shell, spec.args),
            None => (self.options.shell.clone(), self.options.shell_args.clone()),
        };
        PaneState {
            session: None,
            cwd,
            cols,
            rows,
            shell,
            args,
            history: Vec::new(),
        }
    }

    /// Current directory of a pane: what its shell last reported, else what
    /// it was started in.
    fn pane_cwd(&self, pane: &PaneState) -> Option<String> {
        pane.session
            .and_then(|id| self.session(id))
            .and_then(|s| s.cwd())
            .or_else(|| pane.cwd.clone())
    }

    // ========================================================================
    // Tabs and panes
    // ========================================================================

    /// Open a tab and start a session for each of its panes.
    ///
    /// With a `parent`, the tab is placed right after it and panes without a
    /// directory start in the parent's active pane directory. The new tab
    /// becomes active. If any pane fails to start, the sessions already
    /// started are killed and no tab is created.
    pub fn create_tab(
        &self,
        parent: Option<TabId>,
        layout: TabLayout,
    ) -> Result<TabId, RegistryError> {
        let parent_pane = match parent {
            Some(parent) => {
                let layout = self.layout.lock();
                let tab = layout.tab(parent).ok_or(RegistryError::UnknownTab(parent))?;
                layout.pane(tab.active_pane).map(|p| p.state.clone())
            }
            None => None,
        };
        let inherited_cwd = parent_pane.as_ref().and_then(|p| self.pane_cwd(p));

        let tree = layout
            .root
            .map(&mut |spec| self.pane_state(spec, inherited_cwd.as_ref()));

        let mut started = Vec::new();
        let tree = tree.try_map(&mut |mut state| {
            let id = self.start_session(self.spawn_options(&state))?;
            started.push(id);
            state.session = Some(id);
            Ok::<_, SpawnError>(state)
        });
        let tree = match tree {
            Ok(tree) => tree,
            Err(e) => {
                log::warn!("Failed to create tab: {}", e);
                self.discard(&started);
                return Err(e.into());
            }
        };

        let (tab, _) =
            self.layout
                .lock()
                .insert_tab(parent, layout.title, tree, layout.active_pane_index);
        Ok(tab)
    }

    /// Close a tab. Every session in it is dead by the time this returns.
    pub fn close_tab(&self, tab: TabId) -> Result<(), RegistryError> {
        let panes = self
            .layout
            .lock()
            .remove_tab(tab)
            .ok_or(RegistryError::UnknownTab(tab))?;
        let sessions: Vec<SessionId> = panes.iter().filter_map(|p| p.state.session).collect();
        log::info!("Closing {} ({} sessions)", tab, sessions.len());
        self.discard(&sessions);
        Ok(())
    }

    /// Split the tab's active pane. The new pane starts in the active pane's
    /// directory with the same shell and becomes active.
    pub fn split(&self, tab: TabId, direction: SplitDirection) -> Result<PaneId, RegistryError> {
        let (target, source) = {
            let layout = self.layout.lock();
            let tab = layout.tab(tab).ok_or(RegistryError::UnknownTab(tab))?;
            let pane = layout
                .pane(tab.active_pane)
                .ok_or(RegistryError::UnknownPane(tab.active_pane))?;
            (pane.id, pane.state.clone())
        };

        let (cols, rows) = source
            .session
            .and_then(|id| self.session(id))
            .map(|s| s.dimensions())
            .unwrap_or((source.cols, source.rows));
        let mut state = PaneState {
            session: None,
            cwd: self.pane_cwd(&source),
            cols,
            rows,
            shell: source.shell,
            args: source.args,
            history: Vec::new(),
        };
        let session = self.start_session(self.spawn_options(&state))?;
        state.session = Some(session);

        let pane = self.layout.lock().split_pane(target, direction, state);
        match pane {
            Some(pane) => Ok(pane),
            None => {
                // The pane was closed while the shell was starting.
                self.discard(&[session]);
                Err(RegistryError::UnknownPane(target))
            }
        }
    }

    /// Close a pane and kill its session. Closing a tab's last pane closes
    /// the tab.
    pub fn close_pane(&self, pane: PaneId) -> Result<(), RegistryError> {
        let removal = self
            .layout
            .lock()
            .remove_pane(pane)
            .ok_or(RegistryError::UnknownPane(pane))?;
        let removed = match removal {
            PaneRemoval::Collapsed(removed) => removed,
            PaneRemoval::ClosedTab { tab, pane } => {
                log::info!("Closed last pane of {}", tab);
                pane
            }
        };
        if let Some(session) = removed.state.session {
            self.discard(&[session]);
        }
        Ok(())
    }

    /// Tabs in display order.
    pub fn tabs(&self) -> Vec<Tab> {
        self.layout.lock().tabs().to_vec()
    }

    pub fn tab(&self, tab: TabId) -> Option<Tab> {
        self.layout.lock().tab(tab).cloned()
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.layout.lock().active_tab()
    }

    pub fn set_active_tab(&self, tab: TabId) -> bool {
        self.layout.lock().set_active_tab(tab)
    }

    pub fn focus_pane(&self, pane: PaneId) -> bool {
        self.layout.lock().focus_pane(pane)
    }

    /// Panes of a tab in leaf order.
    pub fn panes(&self, tab: TabId) -> Vec<Pane> {
        let layout = self.layout.lock();
        layout
            .panes_in_tab(tab)
            .into_iter()
            .filter_map(|id| layout.pane(id).cloned())
            .collect()
    }

    pub fn pane(&self, pane: PaneId) -> Option<Pane> {
        self.layout.lock().pane(pane).cloned()
    }

    /// Sessions owned by a tab's panes.
    pub fn tab_sessions(&self, tab: TabId) -> Vec<SessionId> {
        self.layout.lock().sessions_in_tab(tab)
    }

    // ========================================================================
    // Snapshot / restore
    // ========================================================================

    /// Capture every tab with its pane tree and each pane's directory,
    /// dimensions, shell and scrollback.
    pub fn snapshot(&self) -> SerializedState {
        let (tabs, active_tab_index) = {
            let layout = self.layout.lock();
            let tabs: Vec<TabSnapshot> = layout
                .tabs()
                .iter()
                .filter_map(|tab| {
                    Some(TabSnapshot {
                        title: tab.title.clone(),
                        active_pane_index: layout.active_leaf_index(tab.id),
                        layout: layout.export_tab(tab.id)?,
                    })
                })
                .collect();
            let active = layout
                .active_tab()
                .and_then(|active| layout.tabs().iter().position(|t| t.id == active))
                .unwrap_or(0);
            (tabs, active)
        };

        capture_session(
            tabs,
            active_tab_index,
            |pane| pane.state.session.and_then(|id| self.session(id)),
            self.options.scrollback_bytes,
        )
    }

    /// Rebuild saved tabs, appending them after any open ones.
    ///
    /// Every pane is respawned in its saved directory (or home, if that is
    /// gone) with its saved scrollback as history. Panes that cannot be
    /// respawned stay in the layout without a session; each problem is
    /// reported per pane and never stops the rest of the restore.
    pub fn restore(&self, state: SerializedState) -> RestoreReport {
        let mut report = RestoreReport::default();
        let active_tab_index = state.active_tab_index;

        for tab in state.tabs {
            self.restore_tab(tab, &mut report);
        }

        if let Some(tab) = report.tabs.get(active_tab_index) {
            self.layout.lock().set_active_tab(*tab);
        }

        log::info!(
            "Restored {} tabs ({} warnings)",
            report.tabs.len(),
            report.warnings.len()
        );
        report
    }

    fn restore_tab(&self, saved: SerializedTab, report: &mut RestoreReport) {
        let mut missing = Vec::new();
        let tree = saved.layout.map(&mut |pane| {
            let planned = plan_pane(pane);
            missing.push(
                planned
                    .missing_cwd
                    .map(|requested| (requested, planned.state.cwd.clone())),
            );
            planned.state
        });

        let mut failures = Vec::new();
        let tree = tree.map(&mut |mut state| {
            match self.start_session(self.spawn_options(&state)) {
                Ok(id) => {
                    state.session = Some(id);
                    // The session holds the history now.
                    state.history = Vec::new();
                    failures.push(None);
                }
                Err(e) => {
                    log::warn!("Failed to respawn {}: {}", state.shell, e);
                    failures.push(Some(e));
                }
            }
            state
        });

        let (tab, panes) =
            self.layout
                .lock()
                .insert_tab(None, Some(saved.title), tree, saved.active_pane_index);

        for ((pane, missing), failure) in panes.into_iter().zip(missing).zip(failures) {
            if let Some((requested, fallback)) = missing {
                report.warnings.push(RestoreWarning::MissingDirectory {
                    pane,
                    requested,
                    fallback,
                });
            }
            if let Some(error) = failure {
                report
                    .warnings
                    .push(RestoreWarning::SpawnFailed { pane, error });
            }
        }
        report.tabs.push(tab);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Drain pending events without blocking. Returns nothing while another
    /// caller is waiting in [`next_event`](Self::next_event).
    pub fn poll_events(&self) -> Vec<SessionEvent> {
        let Ok(mut rx) = self.events_rx.try_lock() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            self.observe(&event);
            events.push(event);
        }
        events
    }

    /// Wait for the next event.
    pub async fn next_event(&self) -> Option<SessionEvent> {
        let event = self.events_rx.lock().await.recv().await;
        if let Some(event) = &event {
            self.observe(event);
        }
        event
    }

    fn observe(&self, event: &SessionEvent) {
        match event {
            SessionEvent::CwdChanged { session, cwd } => {
                let mut layout = self.layout.lock();
                if let Some(pane) = layout.pane_for_session(*session)
                    && let Some(pane) = layout.pane_mut(pane)
                {
                    pane.state.cwd = Some(cwd.clone());
                }
            }
            SessionEvent::SessionExited { session, reason } => {
                log::info!("{} exited: {:?}", session, reason);
                if self.sessions.read().contains_key(session) {
                    self.exits.lock().insert(*session, reason.clone());
                }
            }
            _ => {}
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let sessions: Vec<Arc<PtySession>> =
            self.sessions.get_mut().drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            log::info!("Registry dropped, killing {} sessions", sessions.len());
            kill_all(&sessions);
        }
    }
}

/// Kill sessions in parallel; returns once all of them are dead.
fn kill_all(sessions: &[Arc<PtySession>]) {
    match sessions {
        [] => {}
        [session] => session.kill(),
        _ => std::thread::scope(|scope| {
            for session in sessions {
                let spawned = std::thread::Builder::new()
                    .name(format!("kill-{}", session.id()))
                    .spawn_scoped(scope, move || session.kill());
                if let Err(e) = spawned {
                    log::warn!("Failed to start kill thread: {}", e);
                    session.kill();
                }
            }
        }),
    }
}
