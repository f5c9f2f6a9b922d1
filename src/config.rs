//! Configuration for the extraction pipeline and upload coordinator
//!
//! All tunables in one place with environment variable overrides.
//! The core never reads ambient state directly: construct a config (from
//! defaults, env, or by hand) and pass it in.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Upload coordinator configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum upload attempts per extraction before FAILED becomes terminal
    /// (default: 5)
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts (default: 1s).
    /// Attempt n sleeps base * 2^(n-1)
    pub backoff_base: Duration,

    /// Timeout for each store / graph-database call (default: 30s).
    /// Repeated timeouts trigger the FAILED transition instead of blocking
    pub operation_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl UploadConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("CUSTOGRAPH_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.max_attempts = n.clamp(1, 20);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_BACKOFF_BASE_MS") {
            if let Ok(n) = val.parse::<u64>() {
                config.backoff_base = Duration::from_millis(n);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_OPERATION_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.operation_timeout = Duration::from_secs(n);
            }
        }

        config
    }
}

/// Pipeline configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum needs-analysis score for a NEED entity to be emitted
    /// (default: 0.3)
    pub min_need_score: f32,

    /// Similarity threshold above which RELATES_TO edges are emitted
    /// (default: 0.5)
    pub similarity_threshold: f32,

    /// Maximum skill entities taken from file analysis (default: 5)
    pub max_skills: usize,

    /// Maximum theme-derived concept entities (default: 3)
    pub max_themes: usize,

    /// Maximum goal-derived concept entities (default: 3)
    pub max_goals: usize,

    /// Maximum behavioral pattern / personality trait entities, each
    /// (default: 5)
    pub max_descriptors: usize,

    /// Root directory for the filesystem extraction store
    /// (default: ./custograph_data)
    pub store_root: PathBuf,

    /// Directory for the upload ledger database
    /// (default: ./custograph_data/upload_ledger)
    pub ledger_path: PathBuf,

    /// Upload coordinator settings
    pub upload: UploadConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_need_score: 0.3,
            similarity_threshold: 0.5,
            max_skills: 5,
            max_themes: 3,
            max_goals: 3,
            max_descriptors: 5,
            store_root: PathBuf::from("./custograph_data"),
            ledger_path: PathBuf::from("./custograph_data/upload_ledger"),
            upload: UploadConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("CUSTOGRAPH_MIN_NEED_SCORE") {
            if let Ok(n) = val.parse::<f32>() {
                config.min_need_score = n.clamp(0.0, 1.0);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_SIMILARITY_THRESHOLD") {
            if let Ok(n) = val.parse::<f32>() {
                config.similarity_threshold = n.clamp(0.0, 1.0);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_MAX_SKILLS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_skills = n.clamp(1, 50);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_MAX_DESCRIPTORS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_descriptors = n.clamp(1, 50);
            }
        }

        if let Ok(val) = env::var("CUSTOGRAPH_STORE_PATH") {
            config.store_root = PathBuf::from(val);
        }

        if let Ok(val) = env::var("CUSTOGRAPH_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(val);
        } else {
            config.ledger_path = config.store_root.join("upload_ledger");
        }

        config.upload = UploadConfig::from_env();

        config
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Configuration:");
        info!("   Need score threshold: {:.2}", self.min_need_score);
        info!("   Similarity threshold: {:.2}", self.similarity_threshold);
        info!(
            "   Entity caps: {} skills, {} themes, {} goals, {} descriptors",
            self.max_skills, self.max_themes, self.max_goals, self.max_descriptors
        );
        info!("   Store root: {:?}", self.store_root);
        info!("   Ledger path: {:?}", self.ledger_path);
        info!(
            "   Upload: max {} attempts, {:?} backoff base, {:?} op timeout",
            self.upload.max_attempts, self.upload.backoff_base, self.upload.operation_timeout
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!((config.min_need_score - 0.3).abs() < f32::EPSILON);
        assert!((config.similarity_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.upload.max_attempts, 5);
        assert_eq!(config.upload.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_override() {
        env::set_var("CUSTOGRAPH_MIN_NEED_SCORE", "0.45");
        env::set_var("CUSTOGRAPH_MAX_ATTEMPTS", "3");

        let config = PipelineConfig::from_env();
        assert!((config.min_need_score - 0.45).abs() < f32::EPSILON);
        assert_eq!(config.upload.max_attempts, 3);

        env::remove_var("CUSTOGRAPH_MIN_NEED_SCORE");
        env::remove_var("CUSTOGRAPH_MAX_ATTEMPTS");
    }

    #[test]
    fn test_env_override_clamps() {
        env::set_var("CUSTOGRAPH_SIMILARITY_THRESHOLD", "7.5");
        let config = PipelineConfig::from_env();
        assert!((config.similarity_threshold - 1.0).abs() < f32::EPSILON);
        env::remove_var("CUSTOGRAPH_SIMILARITY_THRESHOLD");
    }
}
