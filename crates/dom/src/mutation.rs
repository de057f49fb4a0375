//! Mutation records and observers.
//!
//! The document publishes one [`MutationRecord`] per change on a broadcast
//! channel. Observers hold a receiver and drain it when they are ready, so a
//! burst of changes is delivered as one batch on the observer's next drain.

use crate::NodeKey;
use core::mem::take;
use log::trace;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Capacity of the mutation channel before slow observers start lagging.
pub(crate) const MUTATION_CHANNEL_CAPACITY: usize = 4096;

/// A single observed change to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children were added to or removed from `target`.
    ChildList {
        target: NodeKey,
        added: Vec<NodeKey>,
        removed: Vec<NodeKey>,
    },
    /// Attribute `name` changed on `target`.
    Attributes { target: NodeKey, name: String },
    /// Text of the text node `target` changed.
    CharacterData { target: NodeKey },
}

impl MutationRecord {
    /// The node the change was reported on.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> NodeKey {
        match self {
            Self::ChildList { target, .. }
            | Self::Attributes { target, .. }
            | Self::CharacterData { target } => *target,
        }
    }
}

/// Which records an observer wants to see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationFilter {
    /// Deliver child list changes.
    pub child_list: bool,
    /// Deliver attribute changes.
    pub attributes: bool,
    /// Restrict attribute changes to these (lowercase) names.
    pub attribute_filter: Option<Vec<String>>,
    /// Deliver text changes.
    pub character_data: bool,
}

impl MutationFilter {
    /// Child list changes plus changes to the listed attributes.
    #[must_use]
    pub fn child_list_and_attributes(names: &[&str]) -> Self {
        Self {
            child_list: true,
            attributes: true,
            attribute_filter: Some(names.iter().map(|name| (*name).to_owned()).collect()),
            character_data: false,
        }
    }

    /// Whether `record` passes this filter.
    #[must_use]
    pub fn accepts(&self, record: &MutationRecord) -> bool {
        match record {
            MutationRecord::ChildList { .. } => self.child_list,
            MutationRecord::Attributes { name, .. } => {
                self.attributes
                    && self
                        .attribute_filter
                        .as_ref()
                        .is_none_or(|names| names.iter().any(|allowed| allowed == name))
            }
            MutationRecord::CharacterData { .. } => self.character_data,
        }
    }
}

/// A connected observer. Dropping it disconnects.
#[derive(Debug)]
pub struct MutationObserver {
    receiver: broadcast::Receiver<MutationRecord>,
    filter: MutationFilter,
    /// Records received by [`Self::changed`] and not yet taken.
    held: Vec<MutationRecord>,
    overflowed: bool,
}

impl MutationObserver {
    pub(crate) const fn new(
        receiver: broadcast::Receiver<MutationRecord>,
        filter: MutationFilter,
    ) -> Self {
        Self {
            receiver,
            filter,
            held: Vec::new(),
            overflowed: false,
        }
    }

    /// Drain every pending record that passes the filter, without waiting.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        let mut records = take(&mut self.held);
        loop {
            match self.receiver.try_recv() {
                Ok(record) => {
                    if self.filter.accepts(&record) {
                        records.push(record);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    trace!("mutation observer lagged by {skipped} records");
                    self.overflowed = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        records
    }

    /// Wait until at least one record is available (or the document is gone).
    ///
    /// Returns `false` once the document has been dropped.
    pub async fn changed(&mut self) -> bool {
        loop {
            if !self.held.is_empty() {
                return true;
            }
            match self.receiver.recv().await {
                Ok(record) => {
                    if self.filter.accepts(&record) {
                        self.held.push(record);
                        return true;
                    }
                }
                Err(RecvError::Lagged(_)) => {
                    self.overflowed = true;
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    /// Whether records were lost since the last call; clears the flag.
    pub fn take_overflow(&mut self) -> bool {
        take(&mut self.overflowed)
    }
}
