use crate::config::SourceConfig;
use std::fmt;

/// One expected remote source file, identified by (year, month).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogEntry {
    pub year: i32,
    pub month: u32,
    key: String,
}

impl CatalogEntry {
    pub fn new(dataset: &str, year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            key: format!("{dataset}_{year:04}-{month:02}.parquet"),
        }
    }

    /// File name shared by the remote object, the local raw file and the checkpoint sets.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.key)
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Ordered list of every file expected upstream for a year range.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Years are inclusive on both ends; months run 1..=12.
    pub fn for_years(dataset: &str, start_year: i32, end_year: i32) -> Self {
        let entries = (start_year..=end_year)
            .flat_map(|year| (1..=12).map(move |month| CatalogEntry::new(dataset, year, month)))
            .collect();
        Self { entries }
    }

    pub fn from_config(source: &SourceConfig) -> Self {
        Self::for_years(&source.dataset, source.start_year, source.end_year)
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key() == key)
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
