//! CountryCatalog — the full country set, loaded once per session, plus the
//! pure filter/paging helpers the browse view is built from.

use tracing::info;

use crate::directory::DirectoryClient;
use crate::error::LoadError;
use crate::model::Country;

/// Countries shown per "page".  Paging is cumulative: page `n` exposes the
/// first `n * PAGE_SIZE` entries of the filtered list.
pub const PAGE_SIZE: usize = 10;

/// The full, unfiltered set of countries.  Immutable after `load`.
#[derive(Debug, Clone, Default)]
pub struct CountryCatalog {
    countries: Vec<Country>,
}

impl CountryCatalog {
    pub fn new(countries: Vec<Country>) -> Self {
        Self { countries }
    }

    /// Fetch the catalog from the directory service.  One call per session;
    /// an empty payload is a `LoadError`, not an empty catalog.
    pub async fn load(client: &DirectoryClient) -> Result<Self, LoadError> {
        let countries = client.countries().await?;
        if countries.is_empty() {
            return Err(LoadError::Empty);
        }
        info!("catalog: loaded {} countries", countries.len());
        Ok(Self::new(countries))
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    /// Look up a country by its ISO code.
    pub fn by_code(&self, code: &str) -> Option<&Country> {
        self.countries.iter().find(|c| c.code == code)
    }

    /// Case-insensitive substring match on the display name.  Pure and
    /// synchronous; empty text matches everything.
    pub fn filter(&self, text: &str) -> Vec<Country> {
        let needle = text.to_lowercase();
        self.countries
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

/// Cumulative paging: the first `page_index * page_size` entries of
/// `filtered`, plus whether more remain.  `page_index` starts at 1.
pub fn page(filtered: &[Country], page_index: usize, page_size: usize) -> (Vec<Country>, bool) {
    let end = page_index.saturating_mul(page_size).min(filtered.len());
    let visible = filtered[..end].to_vec();
    let has_more = end < filtered.len();
    (visible, has_more)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::flag_glyph;

    fn country(code: &str, name: &str) -> Country {
        Country {
            code: code.to_string(),
            name: name.to_string(),
            station_count: 1,
            flag: flag_glyph(code),
        }
    }

    fn catalog() -> CountryCatalog {
        CountryCatalog::new(vec![
            country("FR", "France"),
            country("US", "United States"),
            country("DE", "Germany"),
            country("CF", "Central African Republic"),
        ])
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let c = catalog();
        let hits = c.filter("fr");
        // "fr" matches France and Central African Republic
        assert_eq!(
            hits.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
            vec!["FR", "CF"]
        );
        assert_eq!(c.filter("GERM")[0].code, "DE");
    }

    #[test]
    fn empty_filter_matches_all() {
        let c = catalog();
        assert_eq!(c.filter("").len(), c.len());
    }

    #[test]
    fn filter_fr_selects_france() {
        // Catalog scenario from the station-count view: [FR, US] filtered on "fr".
        let c = CountryCatalog::new(vec![country("FR", "France"), country("US", "United States")]);
        let hits = c.filter("fr");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "FR");
    }

    #[test]
    fn paging_is_cumulative_and_monotonic() {
        let all = catalog().filter("");
        let (p1, more1) = page(&all, 1, 2);
        let (p2, more2) = page(&all, 2, 2);
        assert_eq!(p1.len(), 2);
        assert!(more1);
        assert_eq!(p2.len(), 4);
        assert!(!more2);
        // page n+1 is a superset of page n, in the same order
        assert_eq!(&p2[..p1.len()], &p1[..]);
    }

    #[test]
    fn has_more_is_exact_at_the_boundary() {
        let all = catalog().filter("");
        let (p, more) = page(&all, 2, 2);
        assert_eq!(p.len(), all.len());
        assert!(!more);
        let (p, more) = page(&all, 1, 4);
        assert_eq!(p.len(), 4);
        assert!(!more);
        let (p, more) = page(&all, 1, 3);
        assert_eq!(p.len(), 3);
        assert!(more);
    }

    #[test]
    fn paging_past_the_end_is_clamped() {
        let all = catalog().filter("");
        let (p, more) = page(&all, 99, PAGE_SIZE);
        assert_eq!(p.len(), all.len());
        assert!(!more);
    }

    #[test]
    fn paging_empty_list() {
        let (p, more) = page(&[], 1, PAGE_SIZE);
        assert!(p.is_empty());
        assert!(!more);
    }
}
