//! Render lifecycle.
//!
//! `Init` → `Pending` → `ResolvedOn` | `ResolvedAlreadyDark` → `Disabled`.
//! The two resolved states are terminal: the only way out is `Disabled`,
//! and leaving `Disabled` requires passing through `Pending` again.

use core::fmt;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Where the engine is in its lifecycle for the current document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderState {
    /// Constructed, nothing applied yet.
    #[default]
    #[serde(rename = "init")]
    Init,
    /// Guard applied, outcome undecided.
    #[serde(rename = "pending")]
    Pending,
    /// Page inverted.
    #[serde(rename = "on")]
    ResolvedOn,
    /// Page left as is because it is already dark.
    #[serde(rename = "already-dark")]
    ResolvedAlreadyDark,
    /// Explicitly switched off.
    #[serde(rename = "off")]
    Disabled,
}

impl RenderState {
    /// Wire and marker-attribute name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Pending => "pending",
            Self::ResolvedOn => "on",
            Self::ResolvedAlreadyDark => "already-dark",
            Self::Disabled => "off",
        }
    }

    /// Whether this is one of the two resolved states.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ResolvedOn | Self::ResolvedAlreadyDark)
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Guards every state change of an engine instance.
#[derive(Debug, Default)]
pub struct StateController {
    state: RenderState,
}

impl StateController {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RenderState::Init,
        }
    }

    /// Attempt to move to `next`.
    ///
    /// # Returns
    ///
    /// `true` when the state changed. Requests that repeat the current state,
    /// leave a terminal state for anything but `Disabled`, or leave `Disabled`
    /// for anything but `Pending` are refused and return `false`.
    pub fn transition(&mut self, next: RenderState) -> bool {
        if self.state == next {
            return false;
        }
        if self.state.is_terminal() && next != RenderState::Disabled {
            trace!("refused {} -> {next}: resolved state is locked", self.state);
            return false;
        }
        if self.state == RenderState::Disabled && next != RenderState::Pending {
            trace!("refused {} -> {next}: re-enabling goes through pending", self.state);
            return false;
        }
        debug!("render state {} -> {next}", self.state);
        self.state = next;
        true
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> RenderState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.state.is_terminal()
    }
}
