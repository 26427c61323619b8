//! Run-scoped state: the stage a run is in, every stage it went through and
//! what it skipped or fell back on.
//!
//! A context exists from the moment a request arrives, so a request that
//! fails validation still ends in `Failed`.

use std::fmt;

use chrono::{DateTime, Utc};
use saag_core::{Error, Result, SkippedScene};
use serde::Serialize;

/// Stage of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Validating,
    Searching,
    BandResolving,
    Loading,
    Normalizing,
    ComputingIndex,
    Reducing,
    Assembling,
    FallingBack,
    Ready,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Ready | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Validating => "validating",
            RunState::Searching => "searching",
            RunState::BandResolving => "band_resolving",
            RunState::Loading => "loading",
            RunState::Normalizing => "normalizing",
            RunState::ComputingIndex => "computing_index",
            RunState::Reducing => "reducing",
            RunState::Assembling => "assembling",
            RunState::FallingBack => "falling_back",
            RunState::Ready => "ready",
            RunState::Failed => "failed",
        }
    }

    /// Whether a run in `self` may move to `next`.
    ///
    /// Terminal states have no successors. Once falling back, the run can
    /// only finish. Nothing re-enters `Validating`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        if self.is_terminal() || next == RunState::Validating {
            return false;
        }
        match self {
            RunState::FallingBack => next.is_terminal(),
            _ => true,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
}

/// Everything a run accumulates. One per run, never shared.
#[derive(Debug, Clone)]
pub struct RunContext {
    state: RunState,
    transitions: Vec<Transition>,
    skipped: Vec<SkippedScene>,
    fallback_reason: Option<String>,
    failure: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    /// A fresh context, in `Validating`.
    pub fn new() -> Self {
        Self {
            state: RunState::Validating,
            transitions: Vec::new(),
            skipped: Vec::new(),
            fallback_reason: None,
            failure: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Every state visited, starting with `Validating`.
    pub fn history(&self) -> Vec<RunState> {
        std::iter::once(RunState::Validating)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }

    pub fn enter(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %self.state, to = %next, "Run state");
        self.transitions.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    /// Enter `FallingBack`, remembering why.
    pub fn fall_back(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.enter(RunState::FallingBack)?;
        tracing::warn!(reason = %reason, "Falling back to the synthetic series");
        self.fallback_reason = Some(reason);
        Ok(())
    }

    /// Enter `Failed` with the error that ended the run. A run that already
    /// finished is left as it is.
    pub fn fail(&mut self, error: &Error) {
        if self.state.is_terminal() {
            return;
        }
        let from = self.state;
        self.transitions.push(Transition {
            from,
            to: RunState::Failed,
            at: Utc::now(),
        });
        self.state = RunState::Failed;
        self.failure = Some(error.to_string());
        tracing::error!(stage = %from, "Run failed: {error}");
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn record_skipped(&mut self, skipped: impl IntoIterator<Item = SkippedScene>) {
        self.skipped.extend(skipped);
    }

    pub fn skipped(&self) -> &[SkippedScene] {
        &self.skipped
    }
}
