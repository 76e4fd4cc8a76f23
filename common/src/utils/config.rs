use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::utils::embedding::EmbeddingBackend;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
    S3,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Key required by the operator endpoints. When unset those endpoints reject every call.
    #[serde(default)]
    pub admin_api_key: Option<String>,

    #[serde(default = "default_miniflux_url")]
    pub miniflux_url: String,
    #[serde(default)]
    pub miniflux_api_key: String,
    #[serde(default = "default_feed_timeout_ms")]
    pub miniflux_timeout_ms: u64,
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u32,

    #[serde(default = "default_libretranslate_url")]
    pub libretranslate_url: String,
    #[serde(default)]
    pub libretranslate_api_key: Option<String>,
    #[serde(default = "default_libretranslate_timeout_ms")]
    pub libretranslate_timeout_ms: u64,
    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedder_url")]
    pub embedder_url: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_embedder_timeout_ms")]
    pub embedder_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub embed_enabled: bool,

    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    #[serde(default)]
    pub s3_access_key: Option<String>,
    #[serde(default)]
    pub s3_secret_key: Option<String>,
    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,
    /// Base URL under which stored images are publicly reachable.
    #[serde(default)]
    pub public_media_url: Option<String>,

    #[serde(default = "default_true")]
    pub scrape_enabled: bool,
    #[serde(default = "default_scrape_timeout_ms")]
    pub scrape_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub scrape_user_agent: String,
    #[serde(default = "default_scrape_min_length")]
    pub scrape_min_length: usize,
    #[serde(default = "default_image_timeout_ms")]
    pub image_timeout_ms: u64,
    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: usize,

    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u32,
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: usize,
    #[serde(default = "default_translate_concurrency")]
    pub translate_concurrency: usize,
    #[serde(default = "default_summarize_concurrency")]
    pub summarize_concurrency: usize,
    #[serde(default = "default_embed_concurrency")]
    pub embed_concurrency: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_miniflux_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_feed_timeout_ms() -> u64 {
    30_000
}

fn default_sync_batch_size() -> u32 {
    100
}

fn default_libretranslate_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_libretranslate_timeout_ms() -> u64 {
    30_000
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "qwen/qwen3-14b".to_string()
}

fn default_llm_timeout_ms() -> u64 {
    60_000
}

fn default_embedder_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_embedding_dimensions() -> u32 {
    384
}

fn default_embedder_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_s3_bucket() -> String {
    "kaiwa-images".to_string()
}

fn default_scrape_timeout_ms() -> u64 {
    15_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; Kaiwa/1.0; +https://github.com/Gnzaga/kaiwa)".to_string()
}

fn default_scrape_min_length() -> usize {
    200
}

fn default_image_timeout_ms() -> u64 {
    10_000
}

fn default_image_max_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_poll_interval_minutes() -> u32 {
    15
}

fn default_regions() -> Vec<String> {
    ["jp", "us", "ph", "tw"].map(String::from).to_vec()
}

fn default_scrape_concurrency() -> usize {
    2
}

fn default_translate_concurrency() -> usize {
    3
}

fn default_summarize_concurrency() -> usize {
    2
}

fn default_embed_concurrency() -> usize {
    2
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "kaiwa".to_string(),
            surrealdb_database: "kaiwa".to_string(),
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            admin_api_key: None,
            miniflux_url: default_miniflux_url(),
            miniflux_api_key: String::new(),
            miniflux_timeout_ms: default_feed_timeout_ms(),
            sync_batch_size: default_sync_batch_size(),
            libretranslate_url: default_libretranslate_url(),
            libretranslate_api_key: None,
            libretranslate_timeout_ms: default_libretranslate_timeout_ms(),
            target_language: default_target_language(),
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            llm_model: default_llm_model(),
            llm_timeout_ms: default_llm_timeout_ms(),
            embedding_backend: EmbeddingBackend::default(),
            embedder_url: default_embedder_url(),
            embedding_model: None,
            embedding_dimensions: default_embedding_dimensions(),
            embedder_timeout_ms: default_embedder_timeout_ms(),
            embed_enabled: true,
            storage: default_storage_kind(),
            s3_endpoint: None,
            s3_region: default_s3_region(),
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: default_s3_bucket(),
            public_media_url: None,
            scrape_enabled: true,
            scrape_timeout_ms: default_scrape_timeout_ms(),
            scrape_user_agent: default_user_agent(),
            scrape_min_length: default_scrape_min_length(),
            image_timeout_ms: default_image_timeout_ms(),
            image_max_bytes: default_image_max_bytes(),
            poll_interval_minutes: default_poll_interval_minutes(),
            regions: default_regions(),
            scrape_concurrency: default_scrape_concurrency(),
            translate_concurrency: default_translate_concurrency(),
            summarize_concurrency: default_summarize_concurrency(),
            embed_concurrency: default_embed_concurrency(),
        }
    }
}

impl AppConfig {
    /// Cron expression (with seconds) firing every `poll_interval_minutes`.
    pub fn sync_cron(&self) -> String {
        let minutes = self.poll_interval_minutes.clamp(1, 59);
        format!("0 */{minutes} * * * *")
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("regions"),
        )
        .build()?;

    config.try_deserialize()
}
