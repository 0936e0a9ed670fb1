//! StationFetcher — thin client for the radio-browser directory service.
//!
//! Two read-only endpoints are consumed:
//!   GET {base}/countries
//!   GET {base}/stations/bycountrycodeexact/{CODE}?limit=N&hidebroken=true
//!
//! Responses are normalized into domain objects here; the client never
//! mutates shared state — callers apply the returned data themselves.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{FetchError, LoadError};
use crate::model::{flag_glyph, Country, Station};

/// Default directory mirror (overridable via config).
pub const DEFAULT_BASE_URL: &str = "https://de1.api.radio-browser.info/json";

/// Result cap for a single station fetch.  Fixed, not configurable.
pub const STATION_LIMIT: usize = 50;

/// One attempt per user action, no retry; the timeout guarantees every
/// fetch settles instead of leaving the loading flag stuck forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CountryRecord {
    name: String,
    #[serde(default)]
    iso_3166_1: String,
    #[serde(default)]
    stationcount: u32,
}

#[derive(Debug, Deserialize)]
struct StationRecord {
    #[serde(default)]
    stationuuid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url_resolved: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    bitrate: u32,
    #[serde(default)]
    language: String,
    #[serde(default)]
    votes: u64,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("radioglobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Full country list with derived flag glyphs.
    pub async fn countries(&self) -> Result<Vec<Country>, LoadError> {
        let url = format!("{}/countries", self.base_url);
        debug!("directory: GET {}", url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LoadError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LoadError::Status(resp.status().as_u16()));
        }
        let records: Vec<CountryRecord> = resp
            .json()
            .await
            .map_err(|e| LoadError::Malformed(e.to_string()))?;
        Ok(annotate_countries(records))
    }

    /// Stations for one country code, normalized and capped at
    /// `STATION_LIMIT`.  An empty list is a valid "no stations" outcome.
    pub async fn stations_for(&self, code: &str) -> Result<Vec<Station>, FetchError> {
        let url = format!(
            "{}/stations/bycountrycodeexact/{}?limit={}&hidebroken=true",
            self.base_url,
            code.to_uppercase(),
            STATION_LIMIT
        );
        debug!("directory: GET {}", url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let records: Vec<StationRecord> = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;
        Ok(normalize_stations(records))
    }
}

fn annotate_countries(records: Vec<CountryRecord>) -> Vec<Country> {
    records
        .into_iter()
        .map(|r| Country {
            flag: flag_glyph(&r.iso_3166_1),
            code: r.iso_3166_1,
            name: r.name,
            station_count: r.stationcount,
        })
        .collect()
}

/// Drop unplayable entries, apply defaults, order by descending votes.
///
/// A station with no resolvable stream URL is useless — it is dropped here
/// rather than surfaced as an error later.  The sort is stable so provider
/// order is preserved among equal vote counts.
fn normalize_stations(records: Vec<StationRecord>) -> Vec<Station> {
    let mut stations: Vec<Station> = records
        .into_iter()
        .filter(|r| !r.url_resolved.trim().is_empty())
        .map(|r| Station {
            id: r.stationuuid,
            name: r.name,
            stream_url: r.url_resolved,
            genres: r
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            bitrate_kbps: r.bitrate,
            language: if r.language.trim().is_empty() {
                None
            } else {
                Some(r.language)
            },
            votes: r.votes,
        })
        .collect();
    stations.sort_by(|a, b| b.votes.cmp(&a.votes));
    stations
}
