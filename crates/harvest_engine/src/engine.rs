use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use harvest_core::{
    update, CycleSettings, Effect, HarvestState, HarvestStats, Msg, Provenance, ThreadSnapshot,
};
use url::form_urlencoded;

use crate::delegate::{write_url_list, AssetFetchDelegate, MediaHandoff};
use crate::feed::FeedClient;
use crate::filename::session_basename;
use crate::pacer::Pacer;
use crate::persist::{ensure_output_dir, PersistError};
use crate::session::ArchiveSession;
use crate::warc::{build_response_record, RecordError, WarcInfo};
use crate::FeedError;

/// Placeholder replaced with the item id in `share_url_template`.
pub const POST_ID_PLACEHOLDER: &str = "{post_id}";

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestSettings {
    pub cycle: CycleSettings,
    pub poll_interval: Duration,
    pub output_dir: PathBuf,
    pub media_dir: PathBuf,
    pub locality: String,
    pub latitude: f64,
    pub longitude: f64,
    pub share_url_template: String,
    pub operator: Option<String>,
}

impl HarvestSettings {
    /// Public link for an item. The id is percent-encoded, since the feed
    /// gives no guarantee about which characters it contains.
    pub fn share_url(&self, post_id: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(post_id.as_bytes()).collect();
        self.share_url_template.replace(POST_ID_PLACEHOLDER, &encoded)
    }

    pub fn provenance(&self, post_id: &str) -> Provenance {
        Provenance {
            latitude: self.latitude,
            longitude: self.longitude,
            locality: self.locality.clone(),
            share_url: self.share_url(post_id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("feed request failed: {0}")]
    Feed(#[from] FeedError),
    #[error("failed to persist session: {0}")]
    Persist(#[from] PersistError),
    #[error("cannot open session: {0}")]
    SessionInfo(#[from] RecordError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub stats: HarvestStats,
    pub archives: Vec<PathBuf>,
}

/// Drives the harvest state machine: executes its effects one at a time and
/// feeds the outcomes back in as messages.
///
/// Effects produced while handling an effect run before anything still
/// queued, so a cycle's fetches, archiving and flush happen in order.
pub struct Harvester<F, D, P> {
    settings: HarvestSettings,
    feed: F,
    delegate: D,
    pacer: P,
    state: HarvestState,
    session: Option<ArchiveSession>,
    first_cycle_at: Option<DateTime<Utc>>,
    last_session_name: Option<String>,
    archives: Vec<PathBuf>,
}

impl<F: FeedClient, D: AssetFetchDelegate, P: Pacer> Harvester<F, D, P> {
    pub fn new(settings: HarvestSettings, feed: F, delegate: D, pacer: P) -> Self {
        let state = HarvestState::new(settings.cycle.clone());
        Self {
            settings,
            feed,
            delegate,
            pacer,
            state,
            session: None,
            first_cycle_at: None,
            last_session_name: None,
            archives: Vec::new(),
        }
    }

    pub fn state(&self) -> &HarvestState {
        &self.state
    }

    /// Runs cycles until the session ceiling is passed.
    ///
    /// Transport and persistence failures end the run; there is no retry.
    pub fn run(&mut self) -> Result<RunSummary, HarvestError> {
        self.first_cycle_at = Some(self.pacer.now());
        let mut pending: VecDeque<Effect> = self
            .dispatch(Msg::CycleStarted {
                elapsed: Duration::ZERO,
            })
            .into();

        while let Some(effect) = pending.pop_front() {
            if matches!(effect, Effect::Terminate) {
                engine_info!(
                    "Session ceiling of {:?} reached, stopping",
                    self.settings.cycle.max_session
                );
                break;
            }
            let msg = match self.execute(effect) {
                Ok(msg) => msg,
                Err(err) => {
                    engine_error!("Harvest stopped: {}", err);
                    return Err(err);
                }
            };
            let follow_up = self.dispatch(msg);
            for effect in follow_up.into_iter().rev() {
                pending.push_front(effect);
            }
        }

        Ok(RunSummary {
            stats: self.state.stats(),
            archives: self.archives.clone(),
        })
    }

    fn dispatch(&mut self, msg: Msg) -> Vec<Effect> {
        let is_listing = matches!(msg, Msg::ListingReceived(_));
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        if is_listing {
            let summary = self.state.last_listing();
            engine_info!(
                "Listed {} items: {} new, {} updated, {} unchanged, {} vanished",
                summary.listed,
                summary.new,
                summary.updated,
                summary.unchanged,
                summary.vanished
            );
        }
        effects
    }

    fn execute(&mut self, effect: Effect) -> Result<Msg, HarvestError> {
        let msg = match effect {
            Effect::OpenSession => {
                engine_logging::set_cycle(self.state.cycle());
                let started = self.pacer.now();
                let info =
                    WarcInfo::new(self.settings.locality.as_str(), self.settings.operator.clone())?;
                self.session = Some(ArchiveSession::new(started, &info));
                engine_debug!("Opened session at {}", started);
                Msg::NoOp
            }
            Effect::ListRecent { limit } => Msg::ListingReceived(self.feed.list_recent(limit)?),
            Effect::FetchThread { post_id } => {
                Msg::ThreadFetched(self.feed.fetch_details(&post_id)?)
            }
            Effect::ArchiveThread { snapshot, media } => self.archive_thread(snapshot, media),
            Effect::FlushSession => {
                let wrote_archive = self.flush_session()?;
                Msg::SessionFlushed { wrote_archive }
            }
            Effect::DelegateMedia { urls } => {
                let succeeded = self.delegate_media(&urls);
                Msg::MediaDelegated { succeeded }
            }
            Effect::Sleep => {
                self.pacer.sleep(self.settings.poll_interval);
                Msg::CycleStarted {
                    elapsed: self.elapsed(),
                }
            }
            Effect::Terminate => Msg::NoOp,
        };
        Ok(msg)
    }

    fn archive_thread(&mut self, snapshot: ThreadSnapshot, media: Vec<String>) -> Msg {
        let post_id = snapshot.post_id().to_string();
        let Some(session) = self.session.as_mut() else {
            engine_warn!("No open session for thread {}, dropping it", post_id);
            return Msg::ThreadDropped {
                post_id,
                reason: "no open session".to_string(),
            };
        };
        match build_response_record(&snapshot, &self.settings.provenance(&post_id)) {
            Ok(record) => {
                session.append_response(record);
                Msg::ThreadArchived { post_id, media }
            }
            Err(err) => {
                engine_warn!("Dropping thread {}: {}", post_id, err);
                Msg::ThreadDropped {
                    post_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn flush_session(&mut self) -> Result<bool, PersistError> {
        let Some(session) = self.session.take() else {
            return Ok(false);
        };
        let name = session_basename(&self.settings.locality, session.started());
        let count = session.response_count();
        match session.flush(&self.settings.output_dir, &self.settings.locality)? {
            Some(path) => {
                engine_info!("Wrote {} threads to {:?}", count, path);
                self.archives.push(path);
                self.last_session_name = Some(name);
                Ok(true)
            }
            None => {
                engine_debug!("Nothing changed, no archive written");
                Ok(false)
            }
        }
    }

    /// Hands the cycle's media URLs to the delegate. Failures are logged and
    /// reported as `false`; the URL list file is removed either way.
    fn delegate_media(&mut self, urls: &[String]) -> bool {
        let media_dir = self.settings.media_dir.clone();
        if let Err(err) = ensure_output_dir(&media_dir) {
            engine_warn!("Media directory {:?} unusable: {}", media_dir, err);
            return false;
        }
        let list = match write_url_list(&media_dir, urls) {
            Ok(list) => list,
            Err(err) => {
                engine_warn!("Media handoff skipped: {}", err);
                return false;
            }
        };
        let name = match &self.last_session_name {
            Some(name) => format!("{name}_media"),
            None => format!("{}_media", self.settings.locality),
        };
        let handoff = MediaHandoff {
            url_list: list.path().to_path_buf(),
            dest_dir: media_dir,
            name,
        };
        engine_info!("Fetching {} media urls as {}", urls.len(), handoff.name);
        let result = self.delegate.fetch_assets(&handoff);
        if let Err(err) = list.close() {
            engine_warn!("Failed to remove media url list: {}", err);
        }
        match result {
            Ok(()) => true,
            Err(err) => {
                engine_warn!("Media fetch failed, continuing: {}", err);
                false
            }
        }
    }

    fn elapsed(&self) -> Duration {
        let Some(first) = self.first_cycle_at else {
            return Duration::ZERO;
        };
        (self.pacer.now() - first).to_std().unwrap_or(Duration::ZERO)
    }
}
