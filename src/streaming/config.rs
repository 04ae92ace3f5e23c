//! Streamer configuration

/// Configuration for streaming behavior
///
/// All fields may be changed between ticks; values are sanitized at the
/// start of each update.
#[derive(Clone, Debug)]
pub struct StreamerConfig {
    /// Radius of the square chunk neighborhood around the center chunk
    pub radius_chunks: i32,
    /// Hard cap on resident chunks; excess is evicted farthest-first
    pub max_loaded_chunks: usize,
    /// Per-tick issuance budget for new fetches
    pub max_new_loads_per_update: usize,
    /// Apply the out-of-frustum priority penalty
    pub enable_frustum_culling: bool,
    /// Try the packed binary payload before the text payload
    pub prefer_binary: bool,
    /// Forwarded to the fetcher with every chunk request
    pub use_persistent_cache_for_chunks: bool,
    /// Filter entities through hour/weather gate records
    pub enable_time_weather_gating: bool,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            radius_chunks: 2,
            max_loaded_chunks: 25,
            max_new_loads_per_update: 8,
            enable_frustum_culling: true,
            prefer_binary: false,
            use_persistent_cache_for_chunks: false,
            enable_time_weather_gating: true,
        }
    }
}

impl StreamerConfig {
    /// Clamp values into workable ranges
    pub fn sanitize(&mut self) {
        self.radius_chunks = self.radius_chunks.clamp(0, 24);
        self.max_loaded_chunks = self.max_loaded_chunks.clamp(1, 4000);
        self.max_new_loads_per_update = self.max_new_loads_per_update.max(1);
    }

    /// Wanted-list ranks below this fetch at high priority
    pub fn high_priority_cutoff(&self) -> usize {
        (2 * self.radius_chunks.max(0) as usize + 1).max(9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamerConfig::default();
        assert_eq!(config.radius_chunks, 2);
        assert_eq!(config.max_loaded_chunks, 25);
        assert_eq!(config.max_new_loads_per_update, 8);
        assert!(config.enable_frustum_culling);
        assert!(!config.prefer_binary);
        assert!(!config.use_persistent_cache_for_chunks);
        assert!(config.enable_time_weather_gating);
    }

    #[test]
    fn test_sanitize_clamps() {
        let mut config = StreamerConfig {
            radius_chunks: -3,
            max_loaded_chunks: 0,
            max_new_loads_per_update: 0,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.radius_chunks, 0);
        assert_eq!(config.max_loaded_chunks, 1);
        assert_eq!(config.max_new_loads_per_update, 1);

        config.radius_chunks = 100;
        config.max_loaded_chunks = 1_000_000;
        config.sanitize();
        assert_eq!(config.radius_chunks, 24);
        assert_eq!(config.max_loaded_chunks, 4000);
    }

    #[test]
    fn test_high_priority_cutoff() {
        let mut config = StreamerConfig::default();
        assert_eq!(config.high_priority_cutoff(), 9); // 2*2+1 < 9
        config.radius_chunks = 6;
        assert_eq!(config.high_priority_cutoff(), 13);
    }
}
