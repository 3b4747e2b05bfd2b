//! Cache statistics snapshot

/// Point-in-time view of cache counters and occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found their key
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
    /// Entries removed to stay within the byte budget
    pub evictions: u64,
    /// Entries currently cached
    pub entries: usize,
    /// Sum of cached value sizes
    pub size_bytes: usize,
    /// Configured byte budget
    pub capacity_bytes: usize,
}

impl CacheStats {
    /// Total number of lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hits: 2,
            misses: 1,
            ..CacheStats::default()
        };

        assert_eq!(stats.lookups(), 3);
        assert_eq!(stats.hit_ratio(), 2.0 / 3.0);
    }

    #[test]
    fn test_hit_ratio_without_lookups() {
        assert_eq!(CacheStats::default().hit_ratio(), 0.0);
    }
}
