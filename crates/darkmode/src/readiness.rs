//! Paint-stability waits before the heuristic runs.

use crate::config::EngineConfig;
use dom::{Document, SharedDocument};
use log::{debug, trace};
use tokio::time::{Instant, sleep};

/// Ids of common single-page-app mount points.
const SPA_MOUNT_IDS: [&str; 2] = ["root", "app"];
/// Framework marker attributes.
const SPA_MARKERS: &str = "[data-reactroot], [data-v-app], [ng-app]";
/// Elements that count as content on their own.
const CONTENT_SELECTOR: &str =
    "img, video, main, article, section, [class*=\"content\"], [class*=\"feed\"]";

/// Whether the document carries single-page-app markers.
pub fn looks_like_spa(document: &Document) -> bool {
    if document.body().is_none() {
        return false;
    }
    let scope = document.document_node();
    SPA_MOUNT_IDS
        .iter()
        .any(|id| document.element_by_id(scope, id).is_some())
        || !document.select_all(scope, SPA_MARKERS).is_empty()
}

/// Whether `<body>` has rendered text beyond `min_text_len` characters or a
/// recognisable content element.
pub fn has_meaningful_content(document: &Document, min_text_len: usize) -> bool {
    let Some(body) = document.body() else {
        return false;
    };
    if document.inner_text(body).trim().chars().count() > min_text_len {
        return true;
    }
    !document.select_all(body, CONTENT_SELECTOR).is_empty()
}

/// Two frames, then (for single-page apps) a bounded poll for content, then
/// the settle delay.
pub async fn wait_for_stable_paint(document: &SharedDocument, config: &EngineConfig) {
    sleep(config.frame_interval()).await;
    sleep(config.frame_interval()).await;

    let spa = looks_like_spa(&document.borrow());
    if spa {
        let started = Instant::now();
        let mut satisfied = false;
        while started.elapsed() < config.spa_timeout() {
            if has_meaningful_content(&document.borrow(), config.meaningful_text_len) {
                satisfied = true;
                break;
            }
            sleep(config.spa_poll()).await;
        }
        if satisfied {
            trace!("app content appeared after {:?}", started.elapsed());
        } else {
            debug!("no app content after {:?}; resolving anyway", config.spa_timeout());
        }
    }

    sleep(config.settle()).await;
}
