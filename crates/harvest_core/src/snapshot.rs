use serde::Deserialize;
use serde_json::{json, Value};

/// Opaque feed item identifier.
pub type PostId = String;

/// Key under which the provenance block is injected into an archived thread.
pub const PROVENANCE_KEY: &str = "harvester";

/// One entry of a "list recent items" response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListedItem {
    #[serde(rename = "post_id")]
    pub id: PostId,
    pub updated_at: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image_approved: Option<bool>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ListedItem {
    pub fn new(id: impl Into<PostId>, updated_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: updated_at.into(),
            message: None,
            image_approved: None,
            image_url: None,
        }
    }
}

/// Where and by whom a thread was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub latitude: f64,
    pub longitude: f64,
    pub locality: String,
    pub share_url: String,
}

impl Provenance {
    fn to_value(&self) -> Value {
        json!({
            "latitude": self.latitude,
            "longitude": self.longitude,
            "locality": self.locality,
            "share_url": self.share_url,
        })
    }
}

/// A thread (root item plus replies) as returned by the feed's detail call.
///
/// The attribute tree is kept as-is so that nothing the feed sends is lost on
/// the way into the archive; accessors only read the few fields the harvester
/// itself needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSnapshot {
    post_id: PostId,
    body: Value,
}

impl ThreadSnapshot {
    pub fn new(post_id: impl Into<PostId>, body: Value) -> Self {
        Self {
            post_id: post_id.into(),
            body,
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The root item's attributes (`details`), if the feed sent them.
    pub fn root(&self) -> Option<&Value> {
        self.body.get("details").filter(|v| v.is_object())
    }

    /// Last-modified timestamp of the thread, as sent by the feed.
    pub fn updated_at(&self) -> Option<&str> {
        self.root()
            .and_then(|details| details.get("updated_at"))
            .or_else(|| self.body.get("updated_at"))
            .and_then(Value::as_str)
    }

    /// Replies in the order the feed listed them.
    pub fn replies(&self) -> &[Value] {
        self.body
            .get("replies")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the attribute tree with the provenance block injected.
    ///
    /// A non-object body is wrapped under `thread` so the block always has
    /// somewhere to live.
    pub fn with_provenance(&self, provenance: &Provenance) -> Value {
        let mut tree = match &self.body {
            Value::Object(_) => self.body.clone(),
            other => json!({ "thread": other }),
        };
        if let Value::Object(map) = &mut tree {
            map.insert(PROVENANCE_KEY.to_string(), provenance.to_value());
        }
        tree
    }
}
