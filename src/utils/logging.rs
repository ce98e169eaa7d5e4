// src/utils/logging.rs - Tagged logging helpers for reconciliation stages
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// The stages a reconciliation or evaluation run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Join,
    Oracle,
    Validate,
    Dispatch,
    Eval,
}

impl Stage {
    fn tag(&self) -> (&'static str, &'static str) {
        match self {
            Stage::Join => ("JOIN", "🔗"),
            Stage::Oracle => ("ORACLE", "🔮"),
            Stage::Validate => ("VALIDATE", "🛡️"),
            Stage::Dispatch => ("DISPATCH", "📦"),
            Stage::Eval => ("EVAL", "🧪"),
        }
    }
}

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage: Stage) -> Self {
        let (stage_name, stage_emoji) = stage.tag();
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, label: &str, detail: &str) {
        info!(
            "[{}] {} 🚀 Starting {} ({}): {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            label,
            detail
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    pub fn log_data_loaded(&self, count: usize, data_type: &str) {
        info!(
            "[{}] {} 📊 Loaded {} {} records",
            self.stage_name, self.stage_emoji, count, data_type
        );
    }

    /// Logs every tenth item and the last one.
    pub fn log_names_processed(&self, processed: usize, total: usize) {
        if processed > 0 && (processed % 10 == 0 || processed == total) {
            info!(
                "[{}] {} 📊 Processed {} / {} names",
                self.stage_name, self.stage_emoji, processed, total
            );
        }
    }

    pub fn log_cache_results(&self, cache_hits: usize, cache_misses: usize) {
        let total = cache_hits + cache_misses;
        if total > 0 {
            let hit_rate = (cache_hits as f64 / total as f64) * 100.0;
            info!(
                "[{}] {} 💾 Memo results: {} hits, {} misses ({:.1}% hit rate)",
                self.stage_name, self.stage_emoji, cache_hits, cache_misses, hit_rate
            );
        }
    }

    pub fn log_throttle(&self, wait: Duration, window_tokens: usize, budget: usize) {
        info!(
            "[{}] {} ⏳ Token budget reached ({} / {} this window), waiting {:.1}s",
            self.stage_name,
            self.stage_emoji,
            window_tokens,
            budget,
            wait.as_secs_f32()
        );
    }

    pub fn log_rejection(&self, input_name: &str, raw_response: &str) {
        warn!(
            "[{}] {} 🚫 Rejected out-of-pool response {:?} for input {:?}",
            self.stage_name, self.stage_emoji, raw_response, input_name
        );
    }

    pub fn log_completion(&self, summary: &str) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {}",
            self.stage_name,
            self.stage_emoji,
            self.start_time.elapsed(),
            summary
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn get_stage_name(&self) -> &'static str {
        self.stage_name
    }
}

// Pipeline-level logging functions
pub fn log_pipeline_start(run_id: &str, oracle: &str, threshold: f64) {
    info!("🚀 ===== SPEND RECONCILIATION PIPELINE STARTING =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("⚙️  Configuration:");
    info!("   • Oracle: {}", oracle);
    info!("   • Similarity threshold: {:.2}", threshold);
    info!("====================================================");
}

pub fn log_pipeline_phase(phase: &str, details: Option<&str>) {
    let msg = if let Some(details) = details {
        format!("🔄 Pipeline Phase: {} - {}", phase, details)
    } else {
        format!("🔄 Pipeline Phase: {}", phase)
    };
    info!("{}", msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        assert_eq!(StageLogger::new(Stage::Join).get_stage_name(), "JOIN");
        assert_eq!(StageLogger::new(Stage::Dispatch).get_stage_name(), "DISPATCH");
    }
}
