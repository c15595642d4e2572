//! Cover art selection for the OS media controls bridge.
//!
//! Some platforms refuse now-playing metadata without artwork, so tracks
//! that carry no thumbnail get a generated placeholder. The placeholder is
//! deterministic per track id: the same track always shows the same cover.

use crate::protocol::Track;

/// Returns the artwork URL published for a track: its backend thumbnail
/// when present, otherwise a generated placeholder.
pub fn cover_url(track: &Track) -> String {
    match &track.thumbnail_url {
        Some(url) => url.clone(),
        None => placeholder_data_url(&track.id),
    }
}

/// Builds an inline SVG data URL with a per-track hue derived from the id.
pub fn placeholder_data_url(track_id: &str) -> String {
    let digest = md5::compute(track_id.as_bytes());
    let hue = u32::from(digest[0]) * 360 / 256;
    let accent_hue = (hue + 40) % 360;
    let svg = format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="512" height="512" viewBox="0 0 512 512">"##,
            r##"<rect width="512" height="512" fill="hsl({hue}, 30%, 14%)"/>"##,
            r##"<circle cx="256" cy="256" r="120" fill="none" stroke="hsl({hue}, 20%, 35%)" stroke-width="8"/>"##,
            r##"<circle cx="256" cy="256" r="40" fill="hsl({hue}, 20%, 35%)"/>"##,
            r##"<path d="M220 180 L320 256 L220 332 Z" fill="hsl({accent}, 70%, 62%)"/>"##,
            r##"</svg>"##
        ),
        hue = hue,
        accent = accent_hue,
    );
    format!("data:image/svg+xml,{}", urlencoding::encode(&svg))
}

#[cfg(test)]
mod tests {
    use super::{cover_url, placeholder_data_url};
    use crate::protocol::Track;

    fn track(id: &str, thumbnail_url: Option<&str>) -> Track {
        Track {
            id: id.to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            thumbnail_url: thumbnail_url.map(ToOwned::to_owned),
            duration_ms: None,
        }
    }

    #[test]
    fn test_thumbnail_wins_over_placeholder() {
        let url = cover_url(&track("1", Some("https://cdn.example/1.jpg")));
        assert_eq!(url, "https://cdn.example/1.jpg");
    }

    #[test]
    fn test_placeholder_is_deterministic_per_id() {
        assert_eq!(placeholder_data_url("42"), placeholder_data_url("42"));
    }

    #[test]
    fn test_placeholder_varies_across_ids() {
        assert_ne!(placeholder_data_url("42"), placeholder_data_url("43"));
    }

    #[test]
    fn test_placeholder_is_an_svg_data_url() {
        let url = cover_url(&track("7", None));
        assert!(url.starts_with("data:image/svg+xml,"));
        assert!(url.contains("%3Csvg"));
    }
}
