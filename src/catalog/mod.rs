//! # Source Catalog
//!
//! The approved-source allow-list. Every monitored dependency must be
//! registered here before the runtime will poll it; an unknown name is a
//! configuration defect, not a soft miss. The catalog is immutable after
//! construction so admission checks never race a mutating writer.

use std::collections::{HashMap, HashSet};

use crate::config::{ConfigurationError, SourceEntry};

/// Immutable catalog of approved sources, keyed by name.
///
/// Iteration follows configuration order so poll cycles and reports stay
/// stable run to run.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: HashMap<String, SourceEntry>,
    order: Vec<String>,
}

impl SourceCatalog {
    /// Build a catalog from configuration entries.
    ///
    /// Rejects empty and duplicate names; a catalog that cannot be trusted
    /// is never constructed.
    pub fn from_entries(entries: Vec<SourceEntry>) -> Result<Self, ConfigurationError> {
        let mut sources = HashMap::with_capacity(entries.len());
        let mut order = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.name.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "sources[].name",
                    "every catalog entry needs a non-empty name",
                ));
            }
            if sources.contains_key(&entry.name) {
                return Err(ConfigurationError::duplicate_source(&entry.name));
            }
            order.push(entry.name.clone());
            sources.insert(entry.name.clone(), entry);
        }

        Ok(Self { sources, order })
    }

    /// Whether a source name is approved for monitoring
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Look up a source entry by name
    pub fn get(&self, name: &str) -> Option<&SourceEntry> {
        self.sources.get(name)
    }

    /// Number of approved sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Source entries in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &SourceEntry> {
        self.order.iter().filter_map(|name| self.sources.get(name))
    }

    /// Names of sources marked critical, in configuration order
    pub fn critical_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|entry| entry.critical)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// The provider shared by every named source, if there is exactly one.
    ///
    /// Returns None when any source is unknown, lacks a provider, or the
    /// set spans multiple providers. Used to attach a provider hint to
    /// correlated incidents.
    pub fn shared_provider<'a, I>(&self, names: I) -> Option<&str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut providers = HashSet::new();
        let mut saw_any = false;

        for name in names {
            saw_any = true;
            match self.get(name).and_then(|entry| entry.provider.as_deref()) {
                Some(provider) => {
                    providers.insert(provider);
                }
                None => return None,
            }
        }

        if !saw_any || providers.len() != 1 {
            return None;
        }
        providers.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> SourceEntry {
        SourceEntry {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn entry_with_provider(name: &str, provider: &str) -> SourceEntry {
        SourceEntry {
            name: name.to_string(),
            provider: Some(provider.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_catalog_lookup_and_order() {
        let catalog = SourceCatalog::from_entries(vec![
            entry("fr-bulk"),
            entry("companies-house"),
            entry("opencorporates"),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("fr-bulk"));
        assert!(!catalog.contains("unknown-source"));
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["fr-bulk", "companies-house", "opencorporates"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = SourceCatalog::from_entries(vec![entry("fr-bulk"), entry("fr-bulk")]);
        assert!(matches!(
            result.unwrap_err(),
            ConfigurationError::DuplicateSource { .. }
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = SourceCatalog::from_entries(vec![entry("")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_critical_names() {
        let mut critical = entry("fr-bulk");
        critical.critical = true;
        let catalog = SourceCatalog::from_entries(vec![critical, entry("companies-house")]).unwrap();
        assert_eq!(catalog.critical_names(), vec!["fr-bulk"]);
    }

    #[test]
    fn test_shared_provider() {
        let catalog = SourceCatalog::from_entries(vec![
            entry_with_provider("a", "acme-cloud"),
            entry_with_provider("b", "acme-cloud"),
            entry_with_provider("c", "other-host"),
            entry("d"),
        ])
        .unwrap();

        assert_eq!(catalog.shared_provider(["a", "b"]), Some("acme-cloud"));
        // Mixed providers
        assert_eq!(catalog.shared_provider(["a", "c"]), None);
        // Source without a provider
        assert_eq!(catalog.shared_provider(["a", "d"]), None);
        // Unknown source
        assert_eq!(catalog.shared_provider(["a", "zzz"]), None);
        // Empty set
        assert_eq!(catalog.shared_provider([]), None);
    }
}
