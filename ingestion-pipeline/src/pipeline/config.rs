use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Attempts shared across all translation providers.
    pub translate_attempts: usize,
    pub summarize_attempts: usize,
    pub summarize_temperature: f32,
    pub embed_max_chars: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            translate_attempts: 3,
            summarize_attempts: 3,
            summarize_temperature: 0.2,
            embed_max_chars: 8_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tuning: PipelineTuning,
    pub target_language: String,
    pub scrape_enabled: bool,
    /// Scraped text shorter than this never replaces feed content.
    pub scrape_min_length: usize,
    pub embed_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tuning: PipelineTuning::default(),
            target_language: "en".to_string(),
            scrape_enabled: true,
            scrape_min_length: 200,
            embed_enabled: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: PipelineTuning::default(),
            target_language: config.target_language.clone(),
            scrape_enabled: config.scrape_enabled,
            scrape_min_length: config.scrape_min_length,
            embed_enabled: config.embed_enabled,
        }
    }
}
