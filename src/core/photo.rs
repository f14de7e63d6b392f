//! # Stock photos
//!
//! Decorative images for records that arrive without one.
//!
//! The URL is a pure function of the playground name and a keyword, so the
//! same playground shows the same picture on every render. These images are
//! not of the actual place; the UI falls back to a placeholder glyph if one
//! fails to load.

use super::{Photo, PhotoKind, PlaygroundRecord};

const STOCK_BASE: &str = "https://source.unsplash.com/800x600/";
const STOCK_ATTRIBUTION: &str = "Unsplash";
const SIGNATURE_SPACE: u64 = 1000;

/// Default keyword for stock searches
pub const DEFAULT_KEYWORD: &str = "playground";

/// 64-bit FNV-1a over the lowercased name
fn name_signature(name: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    name.trim()
        .to_lowercase()
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// Stock photo URL for a playground name and content keyword
///
/// # Example
/// ```
/// use playground_explorer::core::photo::stock_photo_url;
/// let a = stock_photo_url("Oak Park", "playground");
/// assert_eq!(a, stock_photo_url("oak park ", "playground"));
/// assert!(a.starts_with("https://"));
/// ```
pub fn stock_photo_url(name: &str, keyword: &str) -> String {
    let keyword: Vec<&str> = keyword.split_whitespace().collect();
    let keyword = if keyword.is_empty() {
        DEFAULT_KEYWORD.to_string()
    } else {
        keyword.join(",")
    };
    let sig = name_signature(name) % SIGNATURE_SPACE;

    match reqwest::Url::parse_with_params(
        STOCK_BASE,
        &[("q", keyword.as_str()), ("sig", sig.to_string().as_str())],
    ) {
        Ok(url) => url.into(),
        // STOCK_BASE is a constant valid URL; keep a usable string regardless
        Err(_) => format!("{STOCK_BASE}?q={keyword}&sig={sig}"),
    }
}

/// Stock photo for a record
pub fn stock_photo(name: &str, keyword: &str) -> Photo {
    Photo {
        url: stock_photo_url(name, keyword),
        attribution: Some(STOCK_ATTRIBUTION.to_string()),
        kind: PhotoKind::Stock,
    }
}

/// Give every record without a photo a stock one
///
/// Records that already carry a photo are untouched.
pub fn attach_stock_photos(records: &mut [PlaygroundRecord], keyword: &str) {
    for record in records.iter_mut().filter(|r| !r.has_photo()) {
        record.photo = Some(stock_photo(&record.name, keyword));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Coordinates, PlaygroundId, Source};

    #[test]
    fn test_url_deterministic() {
        assert_eq!(
            stock_photo_url("Riverside Playground", "playground"),
            stock_photo_url("Riverside Playground", "playground")
        );
    }

    #[test]
    fn test_url_varies_by_name() {
        // Not guaranteed for all names, but these two differ
        assert_ne!(
            stock_photo_url("Riverside Playground", "playground"),
            stock_photo_url("Hilltop Park", "playground")
        );
    }

    #[test]
    fn test_keyword_encoded() {
        let url = stock_photo_url("Any", "kids park");
        assert!(url.contains("q=kids%2Cpark"), "{url}");
    }

    #[test]
    fn test_blank_keyword_uses_default() {
        let url = stock_photo_url("Any", "   ");
        assert!(url.contains("q=playground"), "{url}");
    }

    #[test]
    fn test_attach_only_missing() {
        let coords = Coordinates::new(1.0, 1.0).unwrap();
        let provider = Photo {
            url: "https://example.com/p.jpg".into(),
            attribution: None,
            kind: PhotoKind::Provider,
        };
        let mut records = vec![
            PlaygroundRecord::new(PlaygroundId::new(Source::ExternalPlaces, "a"), "A", coords)
                .with_photo(provider.clone()),
            PlaygroundRecord::new(PlaygroundId::new(Source::UserDatabase, "1"), "B", coords),
        ];

        attach_stock_photos(&mut records, DEFAULT_KEYWORD);

        assert_eq!(records[0].photo.as_ref(), Some(&provider));
        let stock = records[1].photo.as_ref().unwrap();
        assert_eq!(stock.kind, PhotoKind::Stock);
        assert_eq!(stock.url, stock_photo_url("B", DEFAULT_KEYWORD));
    }
}
