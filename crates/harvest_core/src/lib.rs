//! Harvest core: change detection, media extraction and the pure cycle state machine.
mod alive;
mod effect;
mod media;
mod msg;
mod snapshot;
mod state;
mod timestamp;
mod update;

pub use alive::{classify, decide, AliveSet, ChangeDecision, ItemChange};
pub use effect::Effect;
pub use media::{extract_media_urls, normalize_image_url};
pub use msg::Msg;
pub use snapshot::{ListedItem, PostId, Provenance, ThreadSnapshot, PROVENANCE_KEY};
pub use state::{CycleSettings, HarvestState, HarvestStats, ListingSummary, Phase};
pub use timestamp::{normalize, MalformedTimestamp, NormalizedDate};
pub use update::update;
