use serde_json::Value;
use url::Url;

use crate::snapshot::ThreadSnapshot;

/// Collects approved image locators from a thread: root first, then replies
/// in listing order. Duplicates are kept; the downloader deals with them.
pub fn extract_media_urls(snapshot: &ThreadSnapshot) -> Vec<String> {
    snapshot
        .root()
        .into_iter()
        .chain(snapshot.replies())
        .filter_map(approved_image_url)
        .collect()
}

fn approved_image_url(item: &Value) -> Option<String> {
    let approved = item
        .get("image_approved")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !approved {
        return None;
    }
    item.get("image_url")
        .and_then(Value::as_str)
        .and_then(normalize_image_url)
}

/// Completes scheme-relative locators with `http:` and rejects anything that
/// still isn't an absolute URL.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let absolute = if trimmed.starts_with("//") {
        format!("http:{trimmed}")
    } else {
        trimmed.to_string()
    };
    Url::parse(&absolute).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::normalize_image_url;

    #[test]
    fn scheme_relative_gets_http() {
        assert_eq!(
            normalize_image_url("//img.example/a.jpg").as_deref(),
            Some("http://img.example/a.jpg")
        );
    }

    #[test]
    fn absolute_url_kept() {
        assert_eq!(
            normalize_image_url(" https://img.example/b.png ").as_deref(),
            Some("https://img.example/b.png")
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(normalize_image_url(""), None);
        assert_eq!(normalize_image_url("not a url"), None);
    }
}
