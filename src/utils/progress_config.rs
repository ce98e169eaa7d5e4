// src/utils/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress tracking in the batch binaries
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-stage sub-progress bars
    pub detailed: bool,
    /// Whether to show memo hit statistics in progress messages
    pub show_cache_stats: bool,
    /// Parent of the per-stage bars once the pipeline has created one
    pub multi_progress: Option<MultiProgress>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            show_cache_stats: true,
            multi_progress: None,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_cache_stats: env::var("PROGRESS_SHOW_CACHE_STATS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            multi_progress: None,
        }
    }

    /// Creates the pipeline's `MultiProgress` and keeps a handle to it so
    /// later per-stage bars draw underneath the main bar.
    pub fn create_multi_progress(&mut self) -> Option<MultiProgress> {
        if !self.enabled {
            return None;
        }
        let mp = MultiProgress::new();
        self.multi_progress = Some(mp.clone());
        Some(mp)
    }

    /// A per-stage bar of `len` steps, or `None` unless detailed progress is on.
    pub fn create_bar(&self, len: u64, message: &str) -> Option<ProgressBar> {
        if !self.should_show_detailed() {
            return None;
        }
        let pb = match &self.multi_progress {
            Some(mp) => mp.add(ProgressBar::new(len)),
            None => ProgressBar::new(len),
        };
        pb.set_style(bar_style());
        pb.set_message(message.to_string());
        Some(pb)
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_cache_stats(&self) -> bool {
        self.enabled && self.show_cache_stats
    }
}

pub fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert!(config.show_cache_stats);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "false");
        env::set_var("PROGRESS_SHOW_CACHE_STATS", "false");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.detailed);
        assert!(!config.show_cache_stats);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
        env::remove_var("PROGRESS_SHOW_CACHE_STATS");
    }

    #[test]
    fn test_stage_bars_join_the_shared_multi_progress() {
        let mut config = ProgressConfig::default();
        config.multi_progress = Some(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()));
        let pb = config.create_bar(5, "names").unwrap();
        assert!(pb.is_hidden());
        assert_eq!(pb.length(), Some(5));
    }

    #[test]
    fn test_multi_progress_handle_is_kept() {
        let mut config = ProgressConfig::default();
        assert!(config.create_multi_progress().is_some());
        assert!(config.multi_progress.is_some());
    }

    #[test]
    fn test_disabled_config_creates_no_bars() {
        let mut config = ProgressConfig::default();
        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
        assert!(config.create_bar(10, "names").is_none());
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_cache_stats());
    }
}
