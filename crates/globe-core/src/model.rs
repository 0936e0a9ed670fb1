//! Domain types shared by the catalog, directory client, and controllers.

use serde::{Deserialize, Serialize};

/// One country from the directory service.  Immutable once loaded; the full
/// set is fetched once per session and only ever filtered/paged for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code, unique within the catalog.
    pub code: String,
    pub name: String,
    pub station_count: u32,
    /// Regional-indicator flag derived from `code` at load time.
    pub flag: String,
}

/// One playable station.  Re-fetched fresh on every country selection —
/// there is no cross-country cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Station {
    /// Provider UUID, unique within the directory.
    pub id: String,
    pub name: String,
    pub stream_url: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// kbps; 0 means the provider did not report one.
    #[serde(default)]
    pub bitrate_kbps: u32,
    #[serde(default)]
    pub language: Option<String>,
    /// Listener votes — ordering key for the station list.
    #[serde(default)]
    pub votes: u64,
}

/// Detailed playback status as seen by the rest of the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackStatus {
    /// No session exists (never started, stopped, or ended naturally).
    #[default]
    Idle,
    /// Load issued to the audio sink; waiting for audio to flow.
    Loading,
    Playing,
    Paused,
    /// Start failed or the stream died mid-play; session retained with a
    /// message so the UI can show it.
    Errored,
}

/// The single live (or most recently live) playback attempt.
///
/// At most one of these exists at any time; `None` at the controller level
/// is the idle state.  `status` is never `Idle` inside a session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub station: Station,
    pub status: PlaybackStatus,
    pub error: Option<String>,
}

/// Map a two-letter ISO code onto its regional-indicator flag glyph.
/// Anything that is not exactly two ASCII letters yields the generic globe.
pub fn flag_glyph(code: &str) -> String {
    let bytes = code.as_bytes();
    if bytes.len() == 2 && bytes.iter().all(|b| b.is_ascii_alphabetic()) {
        bytes
            .iter()
            .map(|b| {
                let offset = (b.to_ascii_uppercase() - b'A') as u32;
                // 0x1F1E6 = REGIONAL INDICATOR SYMBOL LETTER A; offset stays
                // within 0..26 so the code point is always valid.
                char::from_u32(0x1F1E6 + offset).unwrap_or('\u{1F310}')
            })
            .collect()
    } else {
        "\u{1F310}".to_string() // 🌐
    }
}
