//! Adaptive dark rendering for host documents.
//!
//! The engine decides per page whether to invert it (a light page), leave it
//! alone (a page that is already dark), or stay off, and then keeps the
//! rendering correct while the page mutates:
//!
//! - a pending guard hides the light first paint until a decision is made;
//! - a luminance heuristic detects pages that are already dark;
//! - a page-wide inversion is composed with user filters and two overlays;
//! - images, video, vector graphics, canvas and raster backgrounds are
//!   counter-inverted, including inside shadow trees;
//! - a coalescing reconciliation loop follows later DOM changes.
//!
//! Per-site settings persist across the site's host aliases. All state lives
//! on one thread next to the [`dom::Document`] it renders into.

/// Typed command surface.
pub mod command;
/// Filter composition into render plans.
pub mod compositor;
/// Engine configuration.
pub mod config;
/// Device-wide defaults.
pub mod defaults;
/// The engine facade.
pub mod engine;
/// Already-dark page detection.
pub mod heuristic;
/// Site record persistence.
pub mod persistence;
/// Media protection scanner.
pub mod protection;
/// Paint-stability waits.
pub mod readiness;
/// Coalescing reconciliation queue.
pub mod reconcile;
/// Render primitives.
pub mod render;
/// Site settings and normalisation.
pub mod settings;
/// Site identity.
pub mod site;
/// Render lifecycle state machine.
pub mod state;
/// Origin storage.
pub mod storage;

pub use command::{Command, CommandResponse};
pub use config::EngineConfig;
pub use defaults::GlobalDefaults;
pub use engine::{DarkModeEngine, EngineStats};
pub use heuristic::DarkSignal;
pub use reconcile::Job;
pub use settings::{SettingsPatch, SiteVisualState, Snapshot};
pub use state::RenderState;
pub use storage::{KeyValueStore, OriginStorage, SharedStorage, StorageRegistry};
