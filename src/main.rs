use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod intent;
mod llm;
mod patterns;
mod pipeline;
mod store;
mod synth;
mod util;
mod viz;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::intent::{IntentClassifier, LookupContext, ScoringConfig};
use crate::llm::LlmManager;
use crate::patterns::PatternLibrary;
use crate::pipeline::{Orchestrator, history::HistoryStore};
use crate::store::DataStore;
use crate::store::duckdb_store::DuckDbStore;
use crate::synth::QuerySynthesizer;
use crate::synth::validate::QueryValidator;
use crate::util::logging::init_tracing;
use crate::viz::VisualizationSelector;
use crate::web::state::AppState;

/// Allow-list used when the store cannot report its schema at startup.
fn default_allow_list() -> Vec<String> {
    [
        "car_sales",
        "analytics.kpi_executive_dashboard",
        "analytics.kpi_annual_sales",
        "analytics.kpi_monthly_trends",
        "analytics.kpi_annual_growth",
        "analytics.kpi_model_performance",
        "analytics.kpi_regional_performance",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments and load configuration
    let args = CliArgs::parse();
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.web.json_logs);

    info!(
        "Connecting to sales dataset at {}",
        config.database.connection_string
    );
    let store = Arc::new(DuckDbStore::new(
        config.database.connection_string.clone(),
        config.database.pool_size,
    )?);

    // The known-schema catalog doubles as the validation allow-list.
    let allow_list = match store.schema().await {
        Ok(catalog) => {
            info!("Schema catalog loaded: {} objects", catalog.objects.len());
            let names = catalog.object_names();
            if names.is_empty() { default_allow_list() } else { names }
        }
        Err(e) => {
            warn!("Schema unavailable at startup, using defaults: {}", e);
            default_allow_list()
        }
    };

    // Known categorical values feed the enumerated slot extractors.
    let lookup = load_lookup_context(store.as_ref()).await;

    info!("Initializing generation backend: {}", config.llm.backend);
    let llm_manager = match LlmManager::new(&config.llm) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to initialize generation backend: {}", e);
            return Err(e.into());
        }
    };

    let library = Arc::new(PatternLibrary::builtin());
    info!(
        "Pattern catalog revision {} with {} patterns",
        library.revision(),
        library.len()
    );

    let classifier = IntentClassifier::new(
        Arc::clone(&library),
        lookup,
        ScoringConfig::from(&config.pipeline),
    );
    let synthesizer = QuerySynthesizer::new(
        Arc::clone(&library),
        QueryValidator::new(allow_list, config.pipeline.max_result_rows),
        Arc::new(llm_manager),
        config.pipeline.confidence_floor,
        Duration::from_millis(config.pipeline.generation_timeout_ms),
        Duration::from_millis(config.pipeline.generation_backoff_ms),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        synthesizer,
        store,
        VisualizationSelector::new(library),
        HistoryStore::new(config.pipeline.history_retention),
        config.llm.fallback_enabled,
        Duration::from_millis(config.pipeline.execute_timeout_ms),
    ));

    let app_state = Arc::new(AppState::new(config.clone(), orchestrator));

    info!(
        "Starting salescope server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}

async fn load_lookup_context(store: &DuckDbStore) -> LookupContext {
    let regions = store.distinct_values("car_sales", "region").await;
    let models = store.distinct_values("car_sales", "model").await;
    match (regions, models) {
        (Ok(regions), Ok(models)) if !regions.is_empty() && !models.is_empty() => {
            info!(
                "Lookup context loaded: {} regions, {} models",
                regions.len(),
                models.len()
            );
            LookupContext::new(regions, models)
        }
        (regions, models) => {
            if let Err(e) = &regions {
                warn!("Failed to load known regions: {}", e);
            }
            if let Err(e) = &models {
                warn!("Failed to load known models: {}", e);
            }
            warn!("Falling back to built-in lookup values");
            LookupContext::builtin()
        }
    }
}
