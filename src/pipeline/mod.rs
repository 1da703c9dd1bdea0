//! Request orchestration: sequences classification, synthesis, execution,
//! and chart selection, enforcing per-stage timeouts and assembling an
//! auditable result for every request, failed or not.

pub mod history;

use crate::intent::{Intent, IntentClassifier};
use crate::patterns::Language;
use crate::store::{Cell, ColumnMeta, DataStore, ResultSet, SchemaCatalog, StoreError};
use crate::synth::{QueryPlan, QuerySynthesizer, SynthError};
use crate::viz::{VisualizationSelector, VizOutcome};
use chrono::{DateTime, Utc};
use history::HistoryStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Immutable per-interaction request, owned by the orchestrator for the
/// request's lifetime.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub id: String,
    pub raw_text: String,
    pub context: Option<String>,
    pub language: Option<Language>,
    pub timestamp: DateTime<Utc>,
}

impl QueryRequest {
    pub fn new(
        id: Option<String>,
        raw_text: String,
        context: Option<String>,
        language: Option<Language>,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            id: id.unwrap_or_else(|| format!("req-{}", timestamp.timestamp_micros())),
            raw_text,
            context,
            language,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Classifying,
    Synthesizing,
    Executing,
    Visualizing,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoViableIntent,
    GenerationFailed,
    GenerationTimeout,
    ValidationFailed,
    QueryError,
    ExecutionTimeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result rows plus schema; rows are already bounded by the row ceiling
/// the validator forces onto every plan.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub columns: Vec<ColumnMeta>,
    pub row_count: usize,
    pub rows: Vec<Vec<Cell>>,
}

impl From<&ResultSet> for ResultSummary {
    fn from(result: &ResultSet) -> Self {
        Self {
            columns: result.columns.clone(),
            row_count: result.row_count,
            rows: result.rows.clone(),
        }
    }
}

/// The unit persisted to history; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub id: String,
    pub question: String,
    pub success: bool,
    pub intent: Option<Intent>,
    pub sql_plan: Option<QueryPlan>,
    pub result_summary: Option<ResultSummary>,
    /// Always a chart or an explicit no-visualization marker.
    pub chart_spec: VizOutcome,
    pub stage_timings: Vec<StageTiming>,
    pub generation_attempts_ms: Vec<u64>,
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Example questions returned when nothing could be interpreted.
const SUGGESTIONS: &[&str] = &[
    "Mostre o dashboard executivo",
    "Quais são os top 5 regiões?",
    "Quais são os top 10 modelos?",
    "Mostre as vendas anuais",
    "Qual a performance por região?",
    "Mostre as tendências mensais",
    "Qual o crescimento anual?",
    "Qual a média de preços?",
];

pub struct Orchestrator {
    classifier: IntentClassifier,
    synthesizer: QuerySynthesizer,
    store: Arc<dyn DataStore>,
    selector: VisualizationSelector,
    history: HistoryStore,
    fallback_enabled: bool,
    execute_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        classifier: IntentClassifier,
        synthesizer: QuerySynthesizer,
        store: Arc<dyn DataStore>,
        selector: VisualizationSelector,
        history: HistoryStore,
        fallback_enabled: bool,
        execute_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            synthesizer,
            store,
            selector,
            history,
            fallback_enabled,
            execute_timeout,
        }
    }

    /// Runs one request through the pipeline. Transitions are strictly
    /// forward; every terminal state produces a PipelineResult, and the
    /// result is appended to history before being returned.
    pub async fn run(&self, request: QueryRequest) -> PipelineResult {
        info!(id = %request.id, question = %request.raw_text, stage = ?Stage::Received, "pipeline received request");
        let mut builder = ResultBuilder::new(&request);

        // Classifying
        let started = Instant::now();
        let intents = self
            .classifier
            .classify(&request.raw_text, request.language);
        builder.timing(Stage::Classifying, started);

        // Synthesizing
        let schema_summary = if self.fallback_enabled {
            match self.store.schema().await {
                Ok(catalog) => catalog.summary(),
                Err(e) => {
                    error!(error = %e, "schema summary unavailable for generation");
                    String::new()
                }
            }
        } else {
            String::new()
        };

        let started = Instant::now();
        let synthesis = self
            .synthesizer
            .synthesize(
                &request.raw_text,
                request.context.as_deref(),
                &intents,
                &schema_summary,
                self.fallback_enabled,
            )
            .await;
        builder.timing(Stage::Synthesizing, started);

        let synthesis = match synthesis {
            Ok(synthesis) => synthesis,
            Err(failure) => {
                builder.intent = failure.intent.or_else(|| intents.first().cloned());
                builder.generation_attempts_ms = failure.generation_attempts_ms;
                let (kind, message) = match &failure.error {
                    SynthError::NoViableIntent => {
                        builder.suggestions = SUGGESTIONS.iter().map(|s| s.to_string()).collect();
                        (ErrorKind::NoViableIntent, failure.error.to_string())
                    }
                    SynthError::GenerationFailed(_) => {
                        (ErrorKind::GenerationFailed, failure.error.to_string())
                    }
                    SynthError::GenerationTimeout => {
                        (ErrorKind::GenerationTimeout, failure.error.to_string())
                    }
                    SynthError::ValidationFailed(_) => {
                        (ErrorKind::ValidationFailed, failure.error.to_string())
                    }
                };
                return self
                    .finish(builder.fail(Stage::Synthesizing, kind, message))
                    .await;
            }
        };

        builder.intent = Some(synthesis.intent.clone());
        builder.sql_plan = Some(synthesis.plan.clone());
        builder.generation_attempts_ms = synthesis.generation_attempts_ms.clone();

        // Executing. Spawned so an abandoned request lets the statement
        // finish and its result be discarded; store failures are not
        // retried, they usually indicate a bad plan.
        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let plan = synthesis.plan.clone();
        let handle = tokio::spawn(async move { store.execute(&plan).await });
        let executed = tokio::time::timeout(self.execute_timeout, handle).await;
        builder.timing(Stage::Executing, started);

        let result_set = match executed {
            Err(_) => {
                return self
                    .finish(builder.fail(
                        Stage::Executing,
                        ErrorKind::ExecutionTimeout,
                        "data store execution deadline exceeded".to_string(),
                    ))
                    .await;
            }
            Ok(Err(join_error)) => {
                return self
                    .finish(builder.fail(
                        Stage::Executing,
                        ErrorKind::QueryError,
                        join_error.to_string(),
                    ))
                    .await;
            }
            Ok(Ok(Err(store_error))) => {
                return self
                    .finish(builder.fail(
                        Stage::Executing,
                        ErrorKind::QueryError,
                        store_error.to_string(),
                    ))
                    .await;
            }
            Ok(Ok(Ok(result_set))) => result_set,
        };
        builder.result_summary = Some(ResultSummary::from(&result_set));

        // Visualizing
        let started = Instant::now();
        let chart = self.selector.select(&result_set, &synthesis.intent);
        builder.timing(Stage::Visualizing, started);
        builder.chart_spec = Some(chart);

        self.finish(builder.complete()).await
    }

    async fn finish(&self, result: PipelineResult) -> PipelineResult {
        self.history.append(result.clone()).await;
        if result.success {
            info!(id = %result.id, stage = ?Stage::Completed, "pipeline completed");
        } else if let Some(detail) = &result.error {
            info!(id = %result.id, stage = ?detail.stage, kind = ?detail.kind, "pipeline failed");
        }
        result
    }

    pub async fn history(&self, limit: usize, success: Option<bool>) -> Vec<PipelineResult> {
        self.history.recent(limit, success).await
    }

    pub async fn history_len(&self) -> usize {
        self.history.len().await
    }

    pub async fn schema(&self) -> Result<SchemaCatalog, StoreError> {
        self.store.schema().await
    }

    pub fn catalog_revision(&self) -> u32 {
        self.classifier.library().revision()
    }

    pub fn catalog_len(&self) -> usize {
        self.classifier.library().len()
    }
}

/// Accumulates partial state so failed runs still surface whatever was
/// produced before the failing stage.
struct ResultBuilder {
    id: String,
    question: String,
    timestamp: DateTime<Utc>,
    intent: Option<Intent>,
    sql_plan: Option<QueryPlan>,
    result_summary: Option<ResultSummary>,
    chart_spec: Option<VizOutcome>,
    stage_timings: Vec<StageTiming>,
    generation_attempts_ms: Vec<u64>,
    suggestions: Vec<String>,
}

impl ResultBuilder {
    fn new(request: &QueryRequest) -> Self {
        Self {
            id: request.id.clone(),
            question: request.raw_text.clone(),
            timestamp: request.timestamp,
            intent: None,
            sql_plan: None,
            result_summary: None,
            chart_spec: None,
            stage_timings: Vec::new(),
            generation_attempts_ms: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn timing(&mut self, stage: Stage, started: Instant) {
        self.stage_timings.push(StageTiming {
            stage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn fail(self, stage: Stage, kind: ErrorKind, message: String) -> PipelineResult {
        self.build(false, Some(ErrorDetail { stage, kind, message }))
    }

    fn complete(self) -> PipelineResult {
        self.build(true, None)
    }

    fn build(self, success: bool, error: Option<ErrorDetail>) -> PipelineResult {
        let chart_spec = self.chart_spec.unwrap_or_else(|| {
            let reason = match &error {
                Some(detail) => format!("pipeline failed during {:?}", detail.stage),
                None => "no visualization selected".to_string(),
            };
            VizOutcome::NoVisualization { reason }
        });
        PipelineResult {
            id: self.id,
            question: self.question,
            success,
            intent: self.intent,
            sql_plan: self.sql_plan,
            result_summary: self.result_summary,
            chart_spec,
            stage_timings: self.stage_timings,
            generation_attempts_ms: self.generation_attempts_ms,
            error,
            suggestions: self.suggestions,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::intent::{LookupContext, ScoringConfig};
    use crate::llm::{GenerationError, QueryGenerator};
    use crate::patterns::PatternLibrary;
    use crate::store::{ColumnDef, SemanticType};
    use crate::synth::validate::QueryValidator;
    use crate::viz::ChartFamily;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct MockStore {
        result: Result<ResultSet, String>,
    }

    impl MockStore {
        fn yearly() -> Self {
            Self {
                result: Ok(ResultSet::from_rows(
                    vec![
                        "year".to_string(),
                        "total_units_sold".to_string(),
                        "total_revenue".to_string(),
                    ],
                    vec![
                        vec![Cell::Int(2022), Cell::Int(100), Cell::Float(1.0)],
                        vec![Cell::Int(2023), Cell::Int(120), Cell::Float(1.3)],
                    ],
                )),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
            }
        }

        fn models(count: usize) -> Self {
            let rows = (0..count)
                .map(|i| {
                    vec![
                        Cell::Text(format!("model-{i}")),
                        Cell::Float(1000.0 - i as f64),
                        Cell::Int(500 - i as i64),
                    ]
                })
                .collect();
            Self {
                result: Ok(ResultSet::from_rows(
                    vec![
                        "model".to_string(),
                        "total_revenue".to_string(),
                        "total_units_sold".to_string(),
                    ],
                    rows,
                )),
            }
        }
    }

    #[async_trait]
    impl DataStore for MockStore {
        async fn execute(&self, _plan: &QueryPlan) -> Result<ResultSet, StoreError> {
            self.result.clone().map_err(StoreError::Query)
        }

        async fn schema(&self) -> Result<SchemaCatalog, StoreError> {
            let mut objects = BTreeMap::new();
            objects.insert(
                "car_sales".to_string(),
                vec![ColumnDef {
                    name: "year".to_string(),
                    data_type: "INTEGER".to_string(),
                    nullable: false,
                }],
            );
            Ok(SchemaCatalog { objects })
        }

        async fn distinct_values(
            &self,
            _object: &str,
            _column: &str,
        ) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct NeverGenerator;

    #[async_trait]
    impl QueryGenerator for NeverGenerator {
        async fn generate(
            &self,
            _question: &str,
            _context: Option<&str>,
            _schema: &str,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::ResponseError("should not be called".to_string()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl QueryGenerator for SlowGenerator {
        async fn generate(
            &self,
            _question: &str,
            _context: Option<&str>,
            _schema: &str,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("SELECT 1".to_string())
        }
    }

    fn allow_list() -> Vec<String> {
        vec![
            "car_sales".to_string(),
            "analytics.kpi_executive_dashboard".to_string(),
            "analytics.kpi_annual_sales".to_string(),
            "analytics.kpi_monthly_trends".to_string(),
            "analytics.kpi_annual_growth".to_string(),
            "analytics.kpi_model_performance".to_string(),
            "analytics.kpi_regional_performance".to_string(),
        ]
    }

    fn orchestrator(
        store: Arc<dyn DataStore>,
        generator: Arc<dyn QueryGenerator>,
        fallback_enabled: bool,
        retention: usize,
    ) -> Orchestrator {
        let library = Arc::new(PatternLibrary::builtin());
        let config = PipelineConfig::default();
        Orchestrator::new(
            IntentClassifier::new(
                Arc::clone(&library),
                LookupContext::builtin(),
                ScoringConfig::from(&config),
            ),
            QuerySynthesizer::new(
                Arc::clone(&library),
                QueryValidator::new(allow_list(), 500),
                generator,
                config.confidence_floor,
                Duration::from_millis(50),
                Duration::from_millis(5),
            ),
            store,
            VisualizationSelector::new(library),
            HistoryStore::new(retention),
            fallback_enabled,
            Duration::from_secs(5),
        )
    }

    fn request(text: &str) -> QueryRequest {
        QueryRequest::new(None, text.to_string(), None, None)
    }

    #[tokio::test]
    async fn full_pipeline_produces_line_chart_for_annual_sales() {
        let orch = orchestrator(
            Arc::new(MockStore::yearly()),
            Arc::new(NeverGenerator),
            false,
            10,
        );
        let result = orch.run(request("Mostre as vendas totais por ano")).await;

        assert!(result.success, "error: {:?}", result.error);
        let intent = result.intent.as_ref().expect("intent recorded");
        assert_eq!(intent.pattern_id, "annual_sales");
        assert!(intent.confidence >= 0.5);
        let plan = result.sql_plan.as_ref().expect("plan recorded");
        assert!(plan.sql.contains("analytics.kpi_annual_sales"));
        let VizOutcome::Chart(spec) = &result.chart_spec else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Line);

        let stages: Vec<Stage> = result.stage_timings.iter().map(|t| t.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Classifying,
                Stage::Synthesizing,
                Stage::Executing,
                Stage::Visualizing
            ]
        );
        assert_eq!(orch.history_len().await, 1);
    }

    #[tokio::test]
    async fn top_five_models_produces_sorted_bar_chart() {
        let orch = orchestrator(
            Arc::new(MockStore::models(5)),
            Arc::new(NeverGenerator),
            false,
            10,
        );
        let result = orch
            .run(request("Quais são os top 5 modelos por vendas?"))
            .await;

        assert!(result.success, "error: {:?}", result.error);
        let intent = result.intent.as_ref().expect("intent recorded");
        assert_eq!(intent.pattern_id, "top_n_models");
        assert_eq!(intent.parameters.get("n").and_then(|v| v.as_int()), Some(5));
        let plan = result.sql_plan.as_ref().expect("plan recorded");
        assert!(plan.sql.contains("LIMIT 5"));
        let VizOutcome::Chart(spec) = &result.chart_spec else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Bar);
        assert!(spec.hints.sort_by_value_desc);
        assert_eq!(
            spec.y.as_ref().map(|e| e.column.as_str()),
            Some("total_revenue")
        );
    }

    #[tokio::test]
    async fn gibberish_without_fallback_fails_in_synthesis() {
        let orch = orchestrator(
            Arc::new(MockStore::yearly()),
            Arc::new(NeverGenerator),
            false,
            10,
        );
        let result = orch.run(request("xyzzy blorp frobnicate")).await;

        assert!(!result.success);
        let detail = result.error.as_ref().expect("error recorded");
        assert_eq!(detail.stage, Stage::Synthesizing);
        assert_eq!(detail.kind, ErrorKind::NoViableIntent);
        assert!(!result.suggestions.is_empty());
        assert!(matches!(
            result.chart_spec,
            VizOutcome::NoVisualization { .. }
        ));
        // failures are persisted too
        assert_eq!(orch.history_len().await, 1);
    }

    #[tokio::test]
    async fn store_failure_surfaces_partial_result() {
        let orch = orchestrator(
            Arc::new(MockStore::failing("unknown column after schema drift")),
            Arc::new(NeverGenerator),
            false,
            10,
        );
        let result = orch.run(request("Mostre as vendas totais por ano")).await;

        assert!(!result.success);
        let detail = result.error.as_ref().expect("error recorded");
        assert_eq!(detail.stage, Stage::Executing);
        assert_eq!(detail.kind, ErrorKind::QueryError);
        assert!(detail.message.contains("schema drift"));
        // intent and plan survive the failure
        assert!(result.intent.is_some());
        assert!(result.sql_plan.is_some());
        assert!(result.result_summary.is_none());
    }

    #[tokio::test]
    async fn generation_timeout_records_both_attempts() {
        let orch = orchestrator(
            Arc::new(MockStore::yearly()),
            Arc::new(SlowGenerator),
            true,
            10,
        );
        let result = orch.run(request("xyzzy blorp frobnicate")).await;

        assert!(!result.success);
        let detail = result.error.as_ref().expect("error recorded");
        assert_eq!(detail.stage, Stage::Synthesizing);
        assert_eq!(detail.kind, ErrorKind::GenerationTimeout);
        assert_eq!(result.generation_attempts_ms.len(), 2);
    }

    #[tokio::test]
    async fn scalar_result_completes_with_no_visualization_marker() {
        let scalar = ResultSet::from_rows(
            vec!["total_units_sold".to_string()],
            vec![vec![Cell::Int(4242)]],
        );
        let orch = orchestrator(
            Arc::new(MockStore { result: Ok(scalar) }),
            Arc::new(NeverGenerator),
            false,
            10,
        );
        let result = orch.run(request("total de vendas")).await;

        assert!(result.success, "error: {:?}", result.error);
        assert!(matches!(
            result.chart_spec,
            VizOutcome::NoVisualization { .. }
        ));
        let summary = result.result_summary.as_ref().expect("summary recorded");
        assert_eq!(summary.row_count, 1);
        assert_eq!(summary.columns[0].semantic, SemanticType::Numeric);
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_bounded() {
        let orch = orchestrator(
            Arc::new(MockStore::yearly()),
            Arc::new(NeverGenerator),
            false,
            2,
        );
        orch.run(request("Mostre as vendas totais por ano")).await;
        orch.run(request("xyzzy blorp")).await;
        orch.run(request("Quais são os top 5 modelos por vendas?")).await;

        // retention of 2 dropped the oldest entry
        assert_eq!(orch.history_len().await, 2);
        let recent = orch.history(10, None).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "Quais são os top 5 modelos por vendas?");
        assert_eq!(recent[1].question, "xyzzy blorp");

        let failures = orch.history(10, Some(false)).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].question, "xyzzy blorp");
    }
}
