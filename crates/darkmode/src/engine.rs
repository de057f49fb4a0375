//! The engine facade.
//!
//! One [`DarkModeEngine`] drives one document: it owns the lifecycle state,
//! the persisted site record, and every artifact the engine writes into the
//! page. Handles are cheap clones of the same engine; [`DarkModeEngine::attach`]
//! hands out the engine already bound to a document instead of creating a
//! second one.

use crate::compositor::{RenderPlan, compose, media_selector};
use crate::config::EngineConfig;
use crate::heuristic::detect_without_guard;
use crate::persistence::Persistence;
use crate::protection::{MediaProtection, has_visible_media_surface, involves_interactive_media};
use crate::readiness::wait_for_stable_paint;
use crate::reconcile::{Job, Reconciler};
use crate::render::Renderer;
use crate::settings::{SettingsPatch, SiteVisualState, Snapshot};
use crate::state::{RenderState, StateController};
use crate::storage::KeyValueStore;
use core::cell::RefCell;
use core::future;
use dom::{Document, MutationFilter, MutationRecord, NodeKey, SharedDocument};
use futures::FutureExt as _;
use futures::future::{LocalBoxFuture, Shared};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tokio::time;
use tracing::{Instrument as _, info_span};

/// Attribute names whose changes can add or remove a raster background.
const WATCHED_ATTRIBUTES: [&str; 2] = ["style", "class"];

/// Activity counters, for hosts and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Times the already-dark heuristic ran.
    pub heuristic_runs: u64,
    /// Full renders of a resolved state.
    pub renders: u64,
    /// Inserted subtrees scanned for raster backgrounds.
    pub local_scans: u64,
    /// Shadow-root walks.
    pub shadow_scans: u64,
    /// Sheet and overlay refreshes from the mutation loop.
    pub refreshes: u64,
    /// Job requests absorbed by an already pending job.
    pub coalesced: u64,
}

/// What the reconciliation loop should be doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopSignal {
    /// Not in the "on" state; wait.
    Idle,
    /// Drain mutations and run jobs.
    Active,
    /// The engine was destroyed; exit.
    Closed,
}

/// Document extension pointing back at the engine bound to it.
struct AttachedEngine(Weak<RefCell<EngineCore>>);

type PendingResolve = Shared<LocalBoxFuture<'static, RenderState>>;

struct EngineCore {
    document: SharedDocument,
    config: EngineConfig,
    media: &'static str,
    controller: StateController,
    persistence: Persistence,
    site_state: SiteVisualState,
    renderer: Renderer,
    protection: MediaProtection,
    reconciler: Reconciler,
    /// The in-flight resolution, shared by every concurrent caller.
    resolving: Option<PendingResolve>,
    stats: EngineStats,
    /// Drives [`DarkModeEngine::run_reconciliation`].
    signal: watch::Sender<LoopSignal>,
}

/// Current time on the runtime clock, so paused-clock tests stay consistent.
fn now() -> Instant {
    time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline.into()).await,
        None => future::pending::<()>().await,
    }
}

impl EngineCore {
    fn snapshot(&self) -> Snapshot {
        self.site_state.snapshot(self.controller.state())
    }

    fn persist(&self) {
        self.persistence.save(&self.site_state);
    }

    fn mount_pending(&mut self) {
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        if let Err(err) = self.renderer.mount_pending(&mut document, self.media) {
            warn!("could not mount pending guard: {err}");
        }
    }

    fn plan(&self, document: &Document, state: RenderState) -> RenderPlan {
        let media_visible = has_visible_media_surface(document, self.config.media_min_size);
        compose(state, &self.site_state, media_visible, self.media, &self.config)
    }

    fn detect(&mut self) -> RenderState {
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        self.stats.heuristic_runs += 1;
        match detect_without_guard(&mut document, &self.config) {
            Some(signal) => {
                info!("page is already dark ({signal})");
                RenderState::ResolvedAlreadyDark
            }
            None => RenderState::ResolvedOn,
        }
    }

    fn render_resolved(&mut self, state: RenderState) {
        let _span = info_span!("darkmode.render", state = %state).entered();
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        let plan = self.plan(&document, state);
        if let Err(err) = self.renderer.render(&mut document, &plan) {
            warn!("render failed: {err}");
        }
        self.stats.renders += 1;
    }

    /// Regenerate sheet and overlays without touching the guard.
    fn refresh_visuals(&mut self) {
        let state = self.controller.state();
        if !state.is_terminal() {
            return;
        }
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        let plan = self.plan(&document, state);
        let applied = self
            .renderer
            .apply_sheet(&mut document, &plan)
            .and_then(|()| self.renderer.apply_overlays(&mut document, &plan));
        if let Err(err) = applied {
            warn!("refresh failed: {err}");
        }
        self.stats.refreshes += 1;
    }

    fn cleanup_visuals(&mut self) {
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        if let Err(err) = self.renderer.cleanup(&mut document) {
            warn!("cleanup incomplete: {err}");
        }
        self.protection.clear(&mut document);
    }

    fn apply_disabled(&mut self) {
        self.controller.transition(RenderState::Disabled);
        self.stop_enhancement();
        self.cleanup_visuals();
    }

    /// Transition to `next` and render whatever state the controller settles
    /// on; a refused transition re-renders the current terminal state.
    fn apply_resolved(&mut self, next: RenderState) {
        self.controller.transition(next);
        let state = self.controller.state();
        if !state.is_terminal() {
            debug!("not rendering from {state}");
            return;
        }
        self.render_resolved(state);
        if state == RenderState::ResolvedOn {
            self.start_enhancement();
        } else {
            self.stop_enhancement();
        }
    }

    fn start_enhancement(&mut self) {
        if self.reconciler.is_active() {
            return;
        }
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        self.protection.initial_pass(&mut document);
        let observer =
            document.observe(MutationFilter::child_list_and_attributes(&WATCHED_ATTRIBUTES));
        drop(document);
        self.reconciler.start(observer, now());
        self.send_signal(LoopSignal::Active);
        debug!("media enhancement started");
    }

    fn stop_enhancement(&mut self) {
        if !self.reconciler.is_active() {
            return;
        }
        self.reconciler.stop();
        self.send_signal(LoopSignal::Idle);
        debug!("media enhancement stopped");
    }

    /// `Closed` is final.
    fn send_signal(&self, next: LoopSignal) {
        self.signal.send_if_modified(|current| {
            if *current == LoopSignal::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Whether `record` only describes the engine's own writes.
    fn is_own_write(&self, document: &Document, record: &MutationRecord) -> bool {
        let own = |node: NodeKey| {
            self.renderer.is_artifact(document, node) || self.protection.owns_sheet(node)
        };
        match record {
            MutationRecord::Attributes { target, name } => {
                own(*target)
                    || (document.document_element() == Some(*target)
                        && self.renderer.is_own_root_write(document, *target, name))
            }
            MutationRecord::ChildList {
                target,
                added,
                removed,
            } => {
                own(*target)
                    || (!(added.is_empty() && removed.is_empty())
                        && added.iter().chain(removed).all(|node| own(*node)))
            }
            MutationRecord::CharacterData { target } => document.parent(*target).is_some_and(own),
        }
    }

    fn pump(&mut self, now: Instant) -> usize {
        let batch = self.reconciler.drain();
        if batch.records.is_empty() && !batch.overflowed {
            return 0;
        }
        let shared = Rc::clone(&self.document);
        let mut document = shared.borrow_mut();
        let mut needs_rescan = false;
        let mut needs_refresh = false;
        if batch.overflowed {
            debug!("mutation records overflowed; rescanning the document");
            self.protection.initial_pass(&mut document);
            needs_rescan = true;
            needs_refresh = true;
        }
        for record in &batch.records {
            if self.is_own_write(&document, record) {
                continue;
            }
            match record {
                MutationRecord::ChildList { added, removed, .. } => {
                    for node in added {
                        if !document.is_element(*node) {
                            continue;
                        }
                        self.protection.scan_subtree(&mut document, *node);
                        self.stats.local_scans += 1;
                        needs_rescan = true;
                        needs_refresh |= involves_interactive_media(&document, *node);
                    }
                    needs_refresh |= removed
                        .iter()
                        .any(|node| involves_interactive_media(&document, *node));
                }
                MutationRecord::Attributes { target, .. } => {
                    self.protection.mark_background_node(&mut document, *target);
                    needs_refresh |= involves_interactive_media(&document, *target);
                }
                MutationRecord::CharacterData { .. } => {}
            }
        }
        drop(document);
        if needs_rescan {
            self.reconciler.schedule(Job::ShadowRescan, now);
        }
        if needs_refresh {
            self.reconciler.schedule(Job::VisualRefresh, now);
        }
        trace!("pumped {} mutation records", batch.records.len());
        batch.records.len()
    }

    fn tick(&mut self, now: Instant) -> Vec<Job> {
        let jobs = self.reconciler.take_due(now);
        for job in &jobs {
            match job {
                Job::ShadowRescan => {
                    let shared = Rc::clone(&self.document);
                    let mut document = shared.borrow_mut();
                    if let Some(body) = document.body() {
                        self.protection.scan_shadow_roots(
                            &mut document,
                            body,
                            self.config.scan_node_cap,
                            &self.config.shadow_style_id(),
                        );
                    }
                    self.stats.shadow_scans += 1;
                }
                Job::VisualRefresh => self.refresh_visuals(),
            }
        }
        jobs
    }
}

/// Handle to the dark rendering engine of one document.
#[derive(Clone)]
pub struct DarkModeEngine {
    core: Rc<RefCell<EngineCore>>,
}

impl DarkModeEngine {
    /// Create an engine for `document`, loading the persisted site record.
    ///
    /// # Arguments
    ///
    /// * `document` - The document to render into
    /// * `config` - Ids, timings, and thresholds
    /// * `store` - Origin storage for the site record
    #[must_use]
    pub fn new(
        document: SharedDocument,
        config: EngineConfig,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let hostname = document.borrow().hostname().to_owned();
        let persistence = Persistence::new(store, config.state_prefix(), &hostname);
        let site_state = persistence.load();
        let media = media_selector(&hostname, &config.canvas_exempt_sites);
        let renderer = Renderer::new(&config);
        let reconciler = Reconciler::new(config.rescan_delay(), config.refresh_delay());
        let (signal, _) = watch::channel(LoopSignal::Idle);
        info!(
            "dark mode engine for {} (enabled={})",
            if hostname.is_empty() { "<no host>" } else { &hostname },
            site_state.enabled
        );
        Self {
            core: Rc::new(RefCell::new(EngineCore {
                document,
                config,
                media,
                controller: StateController::new(),
                persistence,
                site_state,
                renderer,
                protection: MediaProtection::new(),
                reconciler,
                resolving: None,
                stats: EngineStats::default(),
                signal,
            })),
        }
    }

    /// The engine bound to `document`, creating and binding one if needed.
    /// `config` and `store` are only used when a new engine is created.
    #[must_use]
    pub fn attach(
        document: &SharedDocument,
        config: EngineConfig,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        let existing = document
            .borrow()
            .extension::<AttachedEngine>()
            .and_then(|attached| attached.0.upgrade());
        if let Some(core) = existing {
            trace!("reusing attached engine");
            return Self { core };
        }
        let engine = Self::new(Rc::clone(document), config, store);
        document
            .borrow_mut()
            .insert_extension(AttachedEngine(Rc::downgrade(&engine.core)));
        engine
    }

    /// Whether both handles drive the same engine.
    #[inline]
    #[must_use]
    pub fn same_engine(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Reload the site record and either mount the pending guard or make
    /// sure nothing of the engine remains in the page.
    pub fn bootstrap(&self) -> &Self {
        let mut core = self.core.borrow_mut();
        core.site_state = core.persistence.load();
        if core.site_state.enabled {
            if core.controller.transition(RenderState::Pending)
                || core.controller.state() == RenderState::Pending
            {
                core.mount_pending();
            }
        } else {
            core.apply_disabled();
        }
        debug!("bootstrapped in state {}", core.controller.state());
        self
    }

    /// Wait for a stable paint, decide between inverting and leaving the page
    /// alone, and render. Concurrent callers share one resolution.
    pub async fn resolve(&self) -> RenderState {
        let pending = {
            let mut core = self.core.borrow_mut();
            if let Some(pending) = &core.resolving {
                trace!("joining in-flight resolution");
                pending.clone()
            } else {
                let engine = self.clone();
                let task = async move {
                    let state = engine
                        .resolve_once()
                        .instrument(info_span!("darkmode.resolve"))
                        .await;
                    engine.core.borrow_mut().resolving = None;
                    state
                }
                .boxed_local()
                .shared();
                core.resolving = Some(task.clone());
                task
            }
        };
        pending.await
    }

    async fn resolve_once(&self) -> RenderState {
        let (document, config) = {
            let mut core = self.core.borrow_mut();
            if !core.site_state.enabled {
                core.apply_disabled();
                return core.controller.state();
            }
            (Rc::clone(&core.document), core.config.clone())
        };

        Document::wait_until_parsed(&document).await;
        wait_for_stable_paint(&document, &config).await;

        let mut core = self.core.borrow_mut();
        if !core.site_state.enabled {
            debug!("disabled while resolving");
            return core.controller.state();
        }
        let next = core.detect();
        core.apply_resolved(next);
        let state = core.controller.state();
        info!("resolved to {state}");
        state
    }

    /// Turn the engine on for this site and persist the choice.
    pub async fn enable(&self) -> &Self {
        let needs_resolve = {
            let mut core = self.core.borrow_mut();
            core.site_state.enabled = true;
            core.persist();
            if core.controller.is_resolved() {
                let next = core.detect();
                core.apply_resolved(next);
                false
            } else {
                core.controller.transition(RenderState::Pending);
                core.mount_pending();
                true
            }
        };
        if needs_resolve {
            self.resolve().await;
        }
        self
    }

    /// Turn the engine off for this site, persist, and strip its artifacts.
    pub fn disable(&self) -> &Self {
        let mut core = self.core.borrow_mut();
        core.site_state.enabled = false;
        core.persist();
        core.apply_disabled();
        info!("dark mode disabled");
        self
    }

    pub async fn toggle(&self) -> &Self {
        if self.is_enabled() {
            self.disable()
        } else {
            self.enable().await
        }
    }

    pub async fn set_enabled(&self, enabled: bool) -> &Self {
        if enabled {
            self.enable().await
        } else {
            self.disable()
        }
    }

    /// Merge `patch` into the site's filters. `enabled` is untouched. A
    /// resolved engine re-renders immediately.
    pub fn update(&self, patch: &SettingsPatch) -> Snapshot {
        let mut core = self.core.borrow_mut();
        core.site_state = core.site_state.patched(patch);
        core.persist();
        let state = core.controller.state();
        if core.site_state.enabled && state.is_terminal() {
            core.render_resolved(state);
        } else if !core.site_state.enabled {
            core.cleanup_visuals();
        }
        core.snapshot()
    }

    /// Restore the defaults, which also disables the engine.
    pub fn reset(&self) -> Snapshot {
        let mut core = self.core.borrow_mut();
        core.site_state = SiteVisualState::DEFAULTS;
        core.persist();
        core.apply_disabled();
        core.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.core.borrow().snapshot()
    }

    #[must_use]
    pub fn state(&self) -> RenderState {
        self.core.borrow().controller.state()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.core.borrow().controller.is_resolved()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.core.borrow().site_state.enabled
    }

    /// Whether the mutation loop is running.
    #[must_use]
    pub fn is_enhancing(&self) -> bool {
        self.core.borrow().reconciler.is_active()
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let core = self.core.borrow();
        EngineStats {
            coalesced: core.reconciler.coalesced(),
            ..core.stats
        }
    }

    /// Whether the site already has a persisted record in either format.
    #[must_use]
    pub fn has_site_record(&self) -> bool {
        self.core.borrow().persistence.has_site_record()
    }

    #[must_use]
    pub fn document(&self) -> SharedDocument {
        Rc::clone(&self.core.borrow().document)
    }

    /// Stop observing, strip every artifact, and unbind from the document.
    /// The persisted record is kept.
    pub fn destroy(&self) {
        let mut core = self.core.borrow_mut();
        core.stop_enhancement();
        core.cleanup_visuals();
        core.controller.transition(RenderState::Disabled);
        core.resolving = None;
        core.send_signal(LoopSignal::Closed);
        let shared = Rc::clone(&core.document);
        drop(core);

        let mut document = shared.borrow_mut();
        let bound_here = document
            .extension::<AttachedEngine>()
            .is_some_and(|attached| attached.0.as_ptr() == Rc::as_ptr(&self.core));
        if bound_here {
            document.remove_extension::<AttachedEngine>();
        }
        info!("dark mode engine destroyed");
    }

    /// Process buffered mutation records: mark new backgrounds right away
    /// and schedule the follow-up jobs.
    ///
    /// # Returns
    ///
    /// The number of records drained.
    pub fn pump(&self, now: Instant) -> usize {
        self.core.borrow_mut().pump(now)
    }

    /// Run the jobs due at `now`.
    pub fn tick(&self, now: Instant) -> Vec<Job> {
        self.core.borrow_mut().tick(now)
    }

    /// Earliest pending job deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.core.borrow().reconciler.next_deadline()
    }

    /// Drive [`pump`](Self::pump) and [`tick`](Self::tick) from document
    /// mutations and job deadlines while the engine is "on". The loop idles
    /// through disable and re-enable, and returns once the engine is
    /// destroyed.
    pub async fn run_reconciliation(&self) {
        let (document, mut signal) = {
            let core = self.core.borrow();
            (Rc::clone(&core.document), core.signal.subscribe())
        };
        let mut wake = document
            .borrow()
            .observe(MutationFilter::child_list_and_attributes(&WATCHED_ATTRIBUTES));
        async {
            loop {
                let current = *signal.borrow_and_update();
                match current {
                    LoopSignal::Closed => break,
                    LoopSignal::Idle => {
                        trace!("reconciliation idle");
                        if signal.changed().await.is_err() {
                            break;
                        }
                        wake.take_records();
                        wake.take_overflow();
                        continue;
                    }
                    LoopSignal::Active => {}
                }
                self.pump(now());
                let deadline = self.next_deadline();
                tokio::select! {
                    alive = wake.changed() => {
                        wake.take_records();
                        wake.take_overflow();
                        if !alive {
                            break;
                        }
                    }
                    () = sleep_until(deadline) => {
                        self.pump(now());
                        self.tick(now());
                    }
                    changed = signal.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        .instrument(info_span!("darkmode.reconcile"))
        .await;
        debug!("reconciliation loop finished");
    }
}
