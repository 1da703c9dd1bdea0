use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: "salescope.duckdb".to_string(),
            pool_size: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub json_logs: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            json_logs: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    /// When false the synthesizer never calls the generation backend and
    /// unmatched questions fail with NoViableIntent.
    pub fallback_enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "sqlcoder".to_string(),
            api_key: None,
            api_url: None,
            fallback_enabled: true,
        }
    }
}

/// Tunables for classification scoring and stage policies. The confidence
/// floor and scoring weights are configuration rather than constants so the
/// multi-language matching can be adjusted without a rebuild.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum confidence for an intent to be synthesized from its template.
    pub confidence_floor: f64,
    /// Score weight awarded for passing the keyword gate.
    pub gate_weight: f64,
    /// Score weight scaled by the proportion of optional trigger terms hit.
    pub term_weight: f64,
    /// Score weight scaled by the proportion of parameter slots satisfied.
    pub param_weight: f64,
    /// Server-side ceiling forced onto any plan without a LIMIT clause.
    pub max_result_rows: u32,
    pub execute_timeout_ms: u64,
    pub generation_timeout_ms: u64,
    /// Delay before the single generation retry.
    pub generation_backoff_ms: u64,
    /// Count-based retention bound for the history log.
    pub history_retention: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
            gate_weight: 0.5,
            term_weight: 0.2,
            param_weight: 0.3,
            max_result_rows: 500,
            execute_timeout_ms: 10_000,
            generation_timeout_ms: 30_000,
            generation_backoff_ms: 500,
            history_retention: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB database file holding the sales dataset
    #[arg(long)]
    pub database: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/salescope/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.connection_string = database.clone();
        }

        config.pipeline.validate()?;

        Ok(config)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weight_sum = self.gate_weight + self.term_weight + self.param_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Message(format!(
                "pipeline scoring weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ConfigError::Message(format!(
                "pipeline.confidence_floor must be in [0, 1], got {}",
                self.confidence_floor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.pipeline.validate().is_ok());
        assert_eq!(config.pipeline.confidence_floor, 0.5);
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let pipeline = PipelineConfig {
            gate_weight: 0.9,
            term_weight: 0.9,
            param_weight: 0.9,
            ..PipelineConfig::default()
        };
        assert!(pipeline.validate().is_err());
    }
}
