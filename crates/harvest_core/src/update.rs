use crate::alive::decide;
use crate::media::extract_media_urls;
use crate::{Effect, HarvestState, Msg, Phase};

/// Pure update function: applies a message to state and returns any effects.
///
/// Messages that arrive in the wrong phase are ignored.
pub fn update(mut state: HarvestState, msg: Msg) -> (HarvestState, Vec<Effect>) {
    let effects = match msg {
        Msg::CycleStarted { elapsed } => match state.phase() {
            // The first cycle always runs; the ceiling is checked between cycles.
            Phase::Idle => start_cycle(&mut state),
            Phase::Sleeping if elapsed > state.settings().max_session => {
                state.set_phase(Phase::Terminated);
                vec![Effect::Terminate]
            }
            Phase::Sleeping => start_cycle(&mut state),
            _ => Vec::new(),
        },
        Msg::ListingReceived(items) => {
            if state.phase() != Phase::Listing {
                return (state, Vec::new());
            }
            let decision = decide(state.alive(), &items);
            let to_fetch = state.begin_fetching(items.len(), decision);
            if to_fetch.is_empty() {
                vec![Effect::FlushSession]
            } else {
                to_fetch
                    .into_iter()
                    .map(|post_id| Effect::FetchThread { post_id })
                    .collect()
            }
        }
        Msg::ThreadFetched(snapshot) => {
            if state.phase() != Phase::Fetching || !state.is_awaiting(snapshot.post_id()) {
                return (state, Vec::new());
            }
            let media = extract_media_urls(&snapshot);
            vec![Effect::ArchiveThread { snapshot, media }]
        }
        Msg::ThreadArchived { post_id, media } => {
            if state.phase() != Phase::Fetching || !state.is_awaiting(&post_id) {
                return (state, Vec::new());
            }
            state.record_archived(media);
            flush_when_settled(&mut state, &post_id)
        }
        Msg::ThreadDropped { post_id, reason: _ } => {
            if state.phase() != Phase::Fetching || !state.is_awaiting(&post_id) {
                return (state, Vec::new());
            }
            state.record_dropped();
            flush_when_settled(&mut state, &post_id)
        }
        Msg::SessionFlushed { wrote_archive } => {
            if state.phase() != Phase::Persisting {
                return (state, Vec::new());
            }
            let urls = state.finish_persisting(wrote_archive);
            if wrote_archive && !urls.is_empty() {
                state.set_phase(Phase::MediaDelegation);
                vec![Effect::DelegateMedia { urls }]
            } else {
                state.set_phase(Phase::Sleeping);
                vec![Effect::Sleep]
            }
        }
        Msg::MediaDelegated { succeeded } => {
            if state.phase() != Phase::MediaDelegation {
                return (state, Vec::new());
            }
            state.record_media_delegated(succeeded);
            state.set_phase(Phase::Sleeping);
            vec![Effect::Sleep]
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn start_cycle(state: &mut HarvestState) -> Vec<Effect> {
    state.begin_cycle();
    vec![
        Effect::OpenSession,
        Effect::ListRecent {
            limit: state.settings().item_limit,
        },
    ]
}

fn flush_when_settled(state: &mut HarvestState, post_id: &str) -> Vec<Effect> {
    if state.settle(post_id) {
        vec![Effect::FlushSession]
    } else {
        Vec::new()
    }
}
