//! Watch mode
//!
//! ```text
//!             change            timer fires
//!   Idle ──────────────▶ Debouncing ──────────▶ Rebuilding
//!    ▲                    │    ▲ change           │   │ change
//!    │                    └────┘ (restart timer)  │   ▼
//!    │        done, nothing pending               │  RebuildingWithPending
//!    └────────────────────────────────────────────┘   │ done
//!                                                     ▼
//!                                                 Debouncing
//! ```
//!
//! [`RebuildLoop`] is the pure state machine; [`drive`] feeds it from a
//! channel. Changes that arrive while a rebuild runs are queued and never
//! restart the timer, so at most one rebuild is in flight.

use std::collections::{BTreeSet, HashSet};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::{debug, info};

use super::library_tasks::FileEvent;
use super::registry::Registry;
use super::task::{LibraryTask, TaskKind, TaskOptions, TaskRequest};
use super::workspace::Workspace;
use crate::domain::{PackageId, TaskStatus};

/// Observable state of the rebuild loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Debouncing,
    Rebuilding,
    RebuildingWithPending,
}

/// Debounced change accumulator
#[derive(Debug, Clone)]
pub struct RebuildLoop {
    debounce: Duration,
    changed: BTreeSet<String>,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl RebuildLoop {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            changed: BTreeSet::new(),
            deadline: None,
            in_flight: false,
        }
    }

    /// Records a changed package; restarts the timer unless a rebuild runs
    pub fn notify_changed(&mut self, package: impl Into<String>, now: Instant) {
        self.changed.insert(package.into());
        if !self.in_flight {
            self.deadline = Some(now + self.debounce);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Starts a rebuild when the timer has fired
    ///
    /// Returns the changed packages and clears them along with the timer.
    pub fn begin_rebuild(&mut self, now: Instant) -> Option<BTreeSet<String>> {
        if self.in_flight || self.deadline.map_or(true, |deadline| deadline > now) {
            return None;
        }
        self.deadline = None;
        self.in_flight = true;
        Some(std::mem::take(&mut self.changed))
    }

    /// Ends the rebuild; re-arms the timer when changes were queued
    pub fn finish_rebuild(&mut self, now: Instant) -> WatchState {
        self.in_flight = false;
        if !self.changed.is_empty() {
            self.deadline = Some(now + self.debounce);
        }
        self.state()
    }

    pub fn state(&self) -> WatchState {
        match (self.in_flight, self.changed.is_empty()) {
            (true, false) => WatchState::RebuildingWithPending,
            (true, true) => WatchState::Rebuilding,
            (false, _) if self.deadline.is_some() => WatchState::Debouncing,
            (false, _) => WatchState::Idle,
        }
    }
}

/// What the driver rebuilds
pub trait RebuildTarget {
    type Event;

    /// Maps an event to the name of the package it changed, if any
    fn changed_package(&mut self, event: Self::Event) -> Option<String>;

    /// Rebuilds after the given packages changed
    fn rebuild(&mut self, changed: &BTreeSet<String>);

    /// Called whenever the loop goes idle after a rebuild
    fn announce_watching(&mut self) {}
}

/// Runs the loop until the channel disconnects with nothing pending
pub fn drive<T: RebuildTarget>(state: &mut RebuildLoop, events: &Receiver<T::Event>, target: &mut T) {
    loop {
        let event = match state.deadline() {
            None => match events.recv() {
                Ok(event) => Some(event),
                Err(_) => break,
            },
            Some(deadline) => {
                match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        None
                    }
                }
            }
        };

        if let Some(event) = event {
            if let Some(package) = target.changed_package(event) {
                state.notify_changed(package, Instant::now());
            }
            continue;
        }

        let Some(changed) = state.begin_rebuild(Instant::now()) else {
            continue;
        };
        target.rebuild(&changed);

        while let Ok(event) = events.try_recv() {
            if let Some(package) = target.changed_package(event) {
                state.notify_changed(package, Instant::now());
            }
        }
        if state.finish_rebuild(Instant::now()) == WatchState::Idle {
            target.announce_watching();
        }
    }
}

/// Packages to rebuild after `changed`, dependencies first
///
/// Everything depending on a changed package, limited to what the
/// selection depends on. With no changes the selection itself is the root.
pub fn invalidated_packages(registry: &Registry, changed: &BTreeSet<String>, selection: &[PackageId]) -> Vec<PackageId> {
    let roots: Vec<PackageId> = if changed.is_empty() {
        selection.to_vec()
    } else {
        changed.iter().filter_map(|name| registry.find_package(name)).collect()
    };
    let affected: HashSet<PackageId> = registry.dependent_closure(&roots).into_iter().collect();

    registry
        .dependency_closure(selection)
        .into_iter()
        .filter(|id| affected.contains(id))
        .collect()
}

/// Watches a package selection and rebuilds on change
#[derive(Debug, Clone)]
pub struct WatcherScope {
    request: TaskRequest,
    debounce: Duration,
}

impl WatcherScope {
    pub fn new(request: TaskRequest, debounce: Duration) -> Self {
        Self { request, debounce }
    }

    /// Attaches watchers, runs a full pass, then rebuilds on change
    ///
    /// Returns the status of the last pass once the event channel closes.
    pub fn run(&self, workspace: &mut Workspace) -> Result<TaskStatus> {
        let Some(events) = workspace.take_events() else {
            bail!("File events are already being consumed");
        };

        let selection = workspace.select_packages(self.request.packages.as_deref());
        let closure = workspace.registry().dependency_closure(&selection);
        let libraries = self.request.libraries.as_deref();

        let attached = workspace.run_on(
            &closure,
            &[TaskKind::Library(LibraryTask::Watch)],
            libraries,
            &TaskOptions::default(),
        );
        if attached.is_failure() {
            workspace
                .reporter_mut()
                .warning("watch", "Some libraries could not be watched");
        }

        let status = workspace.run_on(&closure, &self.request.tasks, libraries, &self.request.options);
        let mut target = WorkspaceTarget {
            workspace,
            request: &self.request,
            selection,
            status,
        };
        target.announce_watching();

        let mut state = RebuildLoop::new(self.debounce);
        drive(&mut state, &events, &mut target);
        Ok(target.status)
    }
}

struct WorkspaceTarget<'a> {
    workspace: &'a mut Workspace,
    request: &'a TaskRequest,
    selection: Vec<PackageId>,
    status: TaskStatus,
}

impl RebuildTarget for WorkspaceTarget<'_> {
    type Event = FileEvent;

    fn changed_package(&mut self, event: FileEvent) -> Option<String> {
        let package = self.workspace.changed_package(&event)?;
        debug!(package = %package, path = %event.path.display(), kind = ?event.kind, "change");
        Some(package)
    }

    fn rebuild(&mut self, changed: &BTreeSet<String>) {
        let targets = invalidated_packages(self.workspace.registry(), changed, &self.selection);
        let names: Vec<&str> = changed.iter().map(String::as_str).collect();
        info!(changed = ?names, packages = targets.len(), "rebuilding");
        self.workspace
            .reporter_mut()
            .info("watch", &format!("Changed: {}", names.join(", ")));

        self.status = self.workspace.run_on(
            &targets,
            &self.request.tasks,
            self.request.libraries.as_deref(),
            &self.request.options,
        );
    }

    fn announce_watching(&mut self) {
        self.workspace
            .reporter_mut()
            .info("watch", "Watching for changes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::PackageScope;
    use std::sync::mpsc::{self, Sender};

    const DEBOUNCE: Duration = Duration::from_millis(500);

    #[test]
    fn changes_inside_the_window_coalesce() {
        let start = Instant::now();
        let mut state = RebuildLoop::new(DEBOUNCE);
        assert_eq!(state.state(), WatchState::Idle);

        state.notify_changed("core", start);
        state.notify_changed("core", start + Duration::from_millis(10));
        state.notify_changed("http", start + Duration::from_millis(20));
        assert_eq!(state.state(), WatchState::Debouncing);

        // The last change restarted the timer
        assert!(state.begin_rebuild(start + Duration::from_millis(510)).is_none());

        let changed = state.begin_rebuild(start + Duration::from_millis(520)).unwrap();
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec!["core", "http"]);
        assert_eq!(state.state(), WatchState::Rebuilding);
        assert_eq!(state.finish_rebuild(start + Duration::from_millis(600)), WatchState::Idle);
    }

    #[test]
    fn changes_during_rebuild_are_queued() {
        let start = Instant::now();
        let mut state = RebuildLoop::new(DEBOUNCE);

        state.notify_changed("core", start);
        let first = start + DEBOUNCE;
        assert!(state.begin_rebuild(first).is_some());

        state.notify_changed("http", first + Duration::from_millis(5));
        assert_eq!(state.state(), WatchState::RebuildingWithPending);
        assert_eq!(state.deadline(), None);

        // No second rebuild while one is in flight
        assert!(state.begin_rebuild(first + Duration::from_secs(5)).is_none());

        let done = first + Duration::from_millis(100);
        assert_eq!(state.finish_rebuild(done), WatchState::Debouncing);
        let second = state.begin_rebuild(done + DEBOUNCE).unwrap();
        assert_eq!(second.into_iter().collect::<Vec<_>>(), vec!["http"]);
    }

    struct Recorder {
        rebuilds: Vec<BTreeSet<String>>,
        late: Option<Sender<String>>,
        idle: usize,
    }

    impl RebuildTarget for Recorder {
        type Event = String;

        fn changed_package(&mut self, event: String) -> Option<String> {
            (!event.is_empty()).then_some(event)
        }

        fn rebuild(&mut self, changed: &BTreeSet<String>) {
            self.rebuilds.push(changed.clone());
            if let Some(sender) = self.late.take() {
                sender.send("http".to_string()).unwrap();
            }
        }

        fn announce_watching(&mut self) {
            self.idle += 1;
        }
    }

    #[test]
    fn driver_rebuilds_once_per_window() {
        let (sender, receiver) = mpsc::channel();
        sender.send("core".to_string()).unwrap();
        sender.send(String::new()).unwrap();
        sender.send("core".to_string()).unwrap();

        let mut recorder = Recorder {
            rebuilds: Vec::new(),
            late: Some(sender.clone()),
            idle: 0,
        };
        drop(sender);

        let mut state = RebuildLoop::new(Duration::from_millis(20));
        drive(&mut state, &receiver, &mut recorder);

        let rebuilds: Vec<Vec<String>> = recorder
            .rebuilds
            .iter()
            .map(|set| set.iter().cloned().collect())
            .collect();
        assert_eq!(rebuilds, vec![vec!["core".to_string()], vec!["http".to_string()]]);
        assert_eq!(recorder.idle, 1);
        assert_eq!(state.state(), WatchState::Idle);
    }

    fn registry() -> (Registry, [PackageId; 4]) {
        let mut registry = Registry::new("tsconfig.json");
        let core = registry.add_package(PackageScope::named("@acme/core", "/ws/core"));
        let http = registry.add_package(PackageScope::named("@acme/http", "/ws/http"));
        let app = registry.add_package(PackageScope::named("@acme/app", "/ws/app"));
        let docs = registry.add_package(PackageScope::named("@acme/docs", "/ws/docs"));
        registry.attach_dependency(http, core);
        registry.attach_dependency(app, http);
        registry.attach_dependency(docs, core);
        (registry, [core, http, app, docs])
    }

    fn names(changed: &[&str]) -> BTreeSet<String> {
        changed.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn invalidation_follows_dependents_within_selection() {
        let (registry, [core, http, app, _docs]) = registry();

        assert_eq!(
            invalidated_packages(&registry, &names(&["@acme/core"]), &[app]),
            vec![core, http, app]
        );
        assert_eq!(
            invalidated_packages(&registry, &names(&["http"]), &[app]),
            vec![http, app]
        );
    }

    #[test]
    fn unrelated_changes_invalidate_nothing() {
        let (registry, [_core, _http, app, _docs]) = registry();

        assert!(invalidated_packages(&registry, &names(&["@acme/docs"]), &[app]).is_empty());
        assert!(invalidated_packages(&registry, &names(&["missing"]), &[app]).is_empty());
    }

    #[test]
    fn no_changes_rebuilds_the_selection() {
        let (registry, [_core, http, _app, docs]) = registry();

        assert_eq!(
            invalidated_packages(&registry, &BTreeSet::new(), &[http, docs]),
            vec![http, docs]
        );
    }
}
