use std::collections::{HashMap, HashSet};

use crate::sampler::ApplicationId;

/// Milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }
}

/// A completed foreground interval for one application.
///
/// `start` is `None` when the application was already in the foreground
/// before observation began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub app: ApplicationId,
    pub start: Option<Timestamp>,
    pub end: Timestamp,
}

/// Tracks which applications are active and since when
#[derive(Debug, Default)]
pub struct StateTracker {
    /// Active applications and their observed start (`None` = unknown)
    active: HashMap<ApplicationId, Option<Timestamp>>,
    /// Whether the first sample has been processed
    primed: bool,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently active applications and their start times
    pub fn active(&self) -> &HashMap<ApplicationId, Option<Timestamp>> {
        &self.active
    }

    /// Diff `current` against the previous sample and return the sessions
    /// that ended at `now`.
    ///
    /// The first call only seeds the active set: every app gets an unknown
    /// start and nothing is reported.
    pub fn process_sample(
        &mut self,
        current: &HashSet<ApplicationId>,
        now: Timestamp,
    ) -> Vec<ClosedSession> {
        if !self.primed {
            self.active = current.iter().map(|app| (app.clone(), None)).collect();
            self.primed = true;
            return Vec::new();
        }

        let gone: Vec<ApplicationId> = self
            .active
            .keys()
            .filter(|app| !current.contains(*app))
            .cloned()
            .collect();

        let mut closed = Vec::with_capacity(gone.len());
        for app in gone {
            if let Some(start) = self.active.remove(&app) {
                closed.push(ClosedSession { app, start, end: now });
            }
        }

        for app in current {
            self.active.entry(app.clone()).or_insert(Some(now));
        }

        closed
    }
}
