use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::evidence::matrix::AllocationPolicy;
use crate::quality::QualityWeights;
use crate::rewrite::validator::ValidationPolicy;
use crate::variants::arbitration::ArbitrationThresholds;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub pipeline: PipelineConfig,
}

/// Tunables for the scoring, arbitration, validation, and session layers.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub quality: QualityWeights,
    pub arbitration: ArbitrationThresholds,
    pub validation: ValidationPolicy,
    pub allocation: AllocationPolicy,
    pub autosave_interval: Duration,
    pub session_ttl: chrono::Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: QualityWeights::default(),
            arbitration: ArbitrationThresholds::default(),
            validation: ValidationPolicy::default(),
            allocation: AllocationPolicy::Shared,
            autosave_interval: Duration::from_secs(30),
            session_ttl: chrono::Duration::hours(24),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = PipelineConfig::default();
        let arbitration = ArbitrationThresholds {
            min_evidence_strength: env_or(
                "ARBITRATION_MIN_EVIDENCE_STRENGTH",
                defaults.arbitration.min_evidence_strength,
            )?,
            decisive_margin: env_or(
                "ARBITRATION_DECISIVE_MARGIN",
                defaults.arbitration.decisive_margin,
            )?,
        };
        let validation = ValidationPolicy {
            min_confidence: env_or(
                "VALIDATION_MIN_CONFIDENCE",
                defaults.validation.min_confidence,
            )?,
            ..defaults.validation
        };
        let allocation = match std::env::var("EVIDENCE_ALLOCATION").as_deref() {
            Err(_) | Ok("shared") => AllocationPolicy::Shared,
            Ok("exclusive") => AllocationPolicy::Exclusive,
            Ok(other) => {
                return Err(anyhow!(
                    "EVIDENCE_ALLOCATION must be 'shared' or 'exclusive', got '{other}'"
                ))
            }
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            pipeline: PipelineConfig {
                quality: defaults.quality,
                arbitration,
                validation,
                allocation,
                autosave_interval: Duration::from_secs(env_or("AUTOSAVE_INTERVAL_SECS", 30)?),
                session_ttl: chrono::Duration::hours(env_or("SESSION_TTL_HOURS", 24)?),
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
