//! Read-mostly cache of tag base point values.
//!
//! Lookups never touch storage: a miss yields the configured default and
//! the engine refreshes the entry from the storage collaborator in the
//! background. Refreshes are last-writer-wins.

use dashmap::DashMap;

/// Cache mapping tag uid → base point value.
pub struct TagRegistryCache {
    points: DashMap<String, u32>,
    default_points: u32,
}

impl TagRegistryCache {
    /// Create an empty cache with the fallback value for unknown tags.
    pub fn new(default_points: u32) -> Self {
        Self {
            points: DashMap::new(),
            default_points,
        }
    }

    /// Cached value for a tag, if any.
    pub fn lookup(&self, tag_uid: &str) -> Option<u32> {
        self.points.get(tag_uid).map(|entry| *entry.value())
    }

    /// Cached value for a tag, or the default for unknown tags.
    pub fn base_points(&self, tag_uid: &str) -> u32 {
        self.lookup(tag_uid).unwrap_or(self.default_points)
    }

    /// Insert or overwrite a tag's value.
    pub fn prime(&self, tag_uid: impl Into<String>, points: u32) {
        self.points.insert(tag_uid.into(), points);
    }

    /// The fallback value applied to unknown tags.
    pub fn default_points(&self) -> u32 {
        self.default_points
    }

    /// Number of cached tags.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cache holds no tags.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_falls_back_to_default() {
        let cache = TagRegistryCache::new(10);
        assert_eq!(cache.lookup("04a1b2c3"), None);
        assert_eq!(cache.base_points("04a1b2c3"), 10);
    }

    #[test]
    fn primed_value_wins_over_default() {
        let cache = TagRegistryCache::new(10);
        cache.prime("04a1b2c3", 25);
        assert_eq!(cache.base_points("04a1b2c3"), 25);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn refresh_is_last_writer_wins() {
        let cache = TagRegistryCache::new(10);
        cache.prime("04a1b2c3", 25);
        cache.prime("04a1b2c3", 40);
        assert_eq!(cache.base_points("04a1b2c3"), 40);
    }
}
