//! Collector configuration.

/// Tunable parameters of the heap and collector.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Cells per arena.
    ///
    /// Default: 4096
    pub arena_cell_count: usize,

    /// Arenas allocated up front.
    ///
    /// Default: 2
    pub initial_arenas: usize,

    /// Arena-count growth factor applied when the free list runs dry.
    ///
    /// Default: 2.0
    pub growth_factor: f64,

    /// Free-cell low-water mark. When the free count drops to or below
    /// this value, the next safepoint triggers a collection.
    ///
    /// Default: 256
    pub min_free_cells: usize,

    /// Print a summary of every collection to stderr.
    ///
    /// Default: false
    pub trace: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            arena_cell_count: 4096,
            initial_arenas: 2,
            growth_factor: 2.0,
            min_free_cells: 256,
            trace: false,
        }
    }
}

impl GcConfig {
    /// Configuration for memory-constrained embeddings.
    pub fn low_memory() -> Self {
        Self {
            arena_cell_count: 512,
            initial_arenas: 1,
            min_free_cells: 64,
            ..Default::default()
        }
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_cell_count < 64 {
            return Err(ConfigError::ArenaTooSmall);
        }
        if self.initial_arenas == 0 {
            return Err(ConfigError::NoInitialArenas);
        }
        if self.growth_factor <= 1.0 {
            return Err(ConfigError::InvalidGrowthFactor);
        }
        if self.min_free_cells >= self.arena_cell_count * self.initial_arenas {
            return Err(ConfigError::LowWaterTooHigh);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Arena must hold at least 64 cells.
    ArenaTooSmall,
    /// At least one initial arena is required.
    NoInitialArenas,
    /// Growth factor must exceed 1.0.
    InvalidGrowthFactor,
    /// Low-water mark must be below the initial capacity.
    LowWaterTooHigh,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ArenaTooSmall => write!(f, "arena must hold at least 64 cells"),
            ConfigError::NoInitialArenas => write!(f, "at least one initial arena is required"),
            ConfigError::InvalidGrowthFactor => write!(f, "growth factor must exceed 1.0"),
            ConfigError::LowWaterTooHigh => {
                write!(f, "low-water mark must be below the initial capacity")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GcConfig::default().validate().is_ok());
        assert!(GcConfig::low_memory().validate().is_ok());
    }

    #[test]
    fn test_invalid_growth_factor() {
        let config = GcConfig {
            growth_factor: 1.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidGrowthFactor));
    }

    #[test]
    fn test_low_water_bound() {
        let config = GcConfig {
            arena_cell_count: 64,
            initial_arenas: 1,
            min_free_cells: 64,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::LowWaterTooHigh));
    }
}
