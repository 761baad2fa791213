use std::time::Duration;

use crate::{ListedItem, PostId, ThreadSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Ready to start a cycle; `elapsed` is wall-clock time since the first one.
    CycleStarted { elapsed: Duration },
    /// The feed returned its most recent items.
    ListingReceived(Vec<ListedItem>),
    /// Detail fetch for a selected thread completed.
    ThreadFetched(ThreadSnapshot),
    /// The thread's response record was appended to the session.
    ThreadArchived { post_id: PostId, media: Vec<String> },
    /// No record could be built for the thread; it is left out of the archive.
    ThreadDropped { post_id: PostId, reason: String },
    /// The session was flushed; `wrote_archive` is false for an empty session.
    SessionFlushed { wrote_archive: bool },
    /// The asset fetch delegate returned.
    MediaDelegated { succeeded: bool },
    /// Fallback for placeholder wiring.
    NoOp,
}
