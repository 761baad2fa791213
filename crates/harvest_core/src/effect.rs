use crate::{PostId, ThreadSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenSession,
    ListRecent { limit: usize },
    FetchThread { post_id: PostId },
    ArchiveThread {
        snapshot: ThreadSnapshot,
        media: Vec<String>,
    },
    FlushSession,
    DelegateMedia { urls: Vec<String> },
    Sleep,
    Terminate,
}
