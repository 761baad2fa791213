use std::collections::BTreeSet;
use std::time::Duration;

use crate::alive::{AliveSet, ChangeDecision};
use crate::PostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Listing,
    Fetching,
    Persisting,
    MediaDelegation,
    Sleeping,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    /// Upper bound on items requested per listing.
    pub item_limit: usize,
    /// Wall-clock ceiling after which no further cycle is started.
    pub max_session: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            item_limit: 60,
            max_session: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Counts from the most recent listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingSummary {
    pub listed: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub vanished: usize,
}

/// Totals over the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestStats {
    pub cycles: u64,
    pub archived: usize,
    pub dropped: usize,
    pub archives_written: usize,
    pub media_handoffs: usize,
    pub media_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarvestState {
    settings: CycleSettings,
    phase: Phase,
    cycle: u64,
    alive: AliveSet,
    pending_alive: Option<AliveSet>,
    awaiting: BTreeSet<PostId>,
    media_urls: Vec<String>,
    last_listing: ListingSummary,
    stats: HarvestStats,
}

impl HarvestState {
    pub fn new(settings: CycleSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of the running (or last) cycle, starting at 1.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The alive-set committed by the last completed cycle.
    pub fn alive(&self) -> &AliveSet {
        &self.alive
    }

    pub fn media_urls(&self) -> &[String] {
        &self.media_urls
    }

    pub fn last_listing(&self) -> ListingSummary {
        self.last_listing
    }

    pub fn stats(&self) -> HarvestStats {
        self.stats
    }

    pub fn is_awaiting(&self, post_id: &str) -> bool {
        self.awaiting.contains(post_id)
    }

    pub(crate) fn begin_cycle(&mut self) {
        self.cycle += 1;
        self.stats.cycles += 1;
        self.phase = Phase::Listing;
        self.pending_alive = None;
        self.awaiting.clear();
        self.media_urls.clear();
    }

    /// Stores the detector's next alive-set as pending and returns the ids to
    /// fetch. The committed alive-set is left alone until the session flushes.
    pub(crate) fn begin_fetching(
        &mut self,
        listed: usize,
        decision: ChangeDecision,
    ) -> Vec<PostId> {
        self.last_listing = ListingSummary {
            listed,
            new: decision.new,
            updated: decision.updated,
            unchanged: decision.unchanged,
            vanished: decision.vanished,
        };
        self.pending_alive = Some(decision.next_alive);
        self.awaiting = decision.to_fetch.iter().cloned().collect();
        self.phase = if self.awaiting.is_empty() {
            Phase::Persisting
        } else {
            Phase::Fetching
        };
        decision.to_fetch
    }

    /// Marks a thread as settled; returns true once nothing is outstanding.
    pub(crate) fn settle(&mut self, post_id: &str) -> bool {
        if !self.awaiting.remove(post_id) {
            return false;
        }
        if self.awaiting.is_empty() {
            self.phase = Phase::Persisting;
            true
        } else {
            false
        }
    }

    pub(crate) fn record_archived(&mut self, media: Vec<String>) {
        self.stats.archived += 1;
        self.media_urls.extend(media);
    }

    pub(crate) fn record_dropped(&mut self) {
        self.stats.dropped += 1;
    }

    /// Ends the persisting phase: commits the pending alive-set and hands back
    /// the cycle's media URLs.
    pub(crate) fn finish_persisting(&mut self, wrote_archive: bool) -> Vec<String> {
        if let Some(next) = self.pending_alive.take() {
            self.alive = next;
        }
        if wrote_archive {
            self.stats.archives_written += 1;
        }
        std::mem::take(&mut self.media_urls)
    }

    pub(crate) fn record_media_delegated(&mut self, succeeded: bool) {
        self.stats.media_handoffs += 1;
        if !succeeded {
            self.stats.media_failures += 1;
        }
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }
}
