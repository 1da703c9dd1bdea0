//! Query synthesis: renders the top-ranked intent's template, falling back
//! to the generation backend when no catalog intent clears the confidence
//! floor. All output passes the same whitelist validation.

pub mod validate;

use crate::intent::{Intent, ParamValue};
use crate::llm::QueryGenerator;
use crate::patterns::PatternLibrary;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use validate::QueryValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClass {
    Template,
    Generated,
}

/// A validated, executable query derived from an Intent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryPlan {
    pub sql: String,
    pub bindings: BTreeMap<String, ParamValue>,
    pub risk: RiskClass,
}

#[derive(Debug)]
pub enum SynthError {
    NoViableIntent,
    GenerationFailed(String),
    GenerationTimeout,
    ValidationFailed(String),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::NoViableIntent => {
                write!(f, "no pattern cleared the confidence floor")
            }
            SynthError::GenerationFailed(msg) => write!(f, "generation failed: {}", msg),
            SynthError::GenerationTimeout => write!(f, "generation timed out"),
            SynthError::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl Error for SynthError {}

pub struct Synthesis {
    pub plan: QueryPlan,
    pub intent: Intent,
    /// Wall-clock duration of each generation attempt, empty on the
    /// template path.
    pub generation_attempts_ms: Vec<u64>,
}

pub struct SynthFailure {
    pub error: SynthError,
    pub intent: Option<Intent>,
    pub generation_attempts_ms: Vec<u64>,
}

pub struct QuerySynthesizer {
    library: Arc<PatternLibrary>,
    validator: QueryValidator,
    generator: Arc<dyn QueryGenerator>,
    confidence_floor: f64,
    generation_timeout: Duration,
    generation_backoff: Duration,
}

impl QuerySynthesizer {
    pub fn new(
        library: Arc<PatternLibrary>,
        validator: QueryValidator,
        generator: Arc<dyn QueryGenerator>,
        confidence_floor: f64,
        generation_timeout: Duration,
        generation_backoff: Duration,
    ) -> Self {
        Self {
            library,
            validator,
            generator,
            confidence_floor,
            generation_timeout,
            generation_backoff,
        }
    }

    /// Walks the ranked intents, rendering the first usable template; when
    /// none renders and fallback is enabled, defers to the generation
    /// backend (one retry after a timeout or transient error).
    pub async fn synthesize(
        &self,
        question: &str,
        context: Option<&str>,
        intents: &[Intent],
        schema_summary: &str,
        fallback_enabled: bool,
    ) -> Result<Synthesis, SynthFailure> {
        let mut last_validation_error = None;

        for intent in intents.iter().filter(|i| i.confidence >= self.confidence_floor) {
            match self.render(intent) {
                Ok(sql) => match self.validator.validate(&sql) {
                    Ok(final_sql) => {
                        info!(pattern = %intent.pattern_id, sql = %final_sql, "rendered template plan");
                        return Ok(Synthesis {
                            plan: QueryPlan {
                                sql: final_sql,
                                bindings: intent.parameters.clone(),
                                risk: RiskClass::Template,
                            },
                            intent: intent.clone(),
                            generation_attempts_ms: Vec::new(),
                        });
                    }
                    Err(reason) => {
                        warn!(pattern = %intent.pattern_id, %reason, "template plan failed validation");
                        last_validation_error = Some(reason);
                    }
                },
                Err(reason) => {
                    warn!(pattern = %intent.pattern_id, %reason, "template rendering failed");
                    last_validation_error = Some(reason);
                }
            }
        }

        let top_confidence = intents.first().map(|i| i.confidence).unwrap_or(0.0);

        if fallback_enabled {
            self.generate(question, context, schema_summary, top_confidence)
                .await
        } else if let Some(reason) = last_validation_error {
            Err(SynthFailure {
                error: SynthError::ValidationFailed(reason),
                intent: intents.first().cloned(),
                generation_attempts_ms: Vec::new(),
            })
        } else {
            Err(SynthFailure {
                error: SynthError::NoViableIntent,
                intent: None,
                generation_attempts_ms: Vec::new(),
            })
        }
    }

    /// Substitutes extracted parameters into the template's pre-declared
    /// placeholders. User text never reaches the query body directly:
    /// enumerated values are canonical catalog entries, numbers are
    /// re-rendered from their parsed form.
    fn render(&self, intent: &Intent) -> Result<String, String> {
        let pattern = self
            .library
            .get(&intent.pattern_id)
            .ok_or_else(|| format!("unknown pattern '{}'", intent.pattern_id))?;

        let mut sql = pattern.template.to_string();
        for slot in pattern.slots {
            let placeholder = format!("{{{}}}", slot.name);
            let rendered = match intent.parameters.get(slot.name) {
                Some(ParamValue::Int(v)) => v.to_string(),
                Some(ParamValue::Text(v)) => quote_literal(v),
                None => match slot.default {
                    Some(default) => default.to_string(),
                    None => return Err(format!("missing required slot '{}'", slot.name)),
                },
            };
            sql = sql.replace(&placeholder, &rendered);
        }
        Ok(sql)
    }

    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        schema_summary: &str,
        top_confidence: f64,
    ) -> Result<Synthesis, SynthFailure> {
        let mut attempts_ms = Vec::new();
        let mut last_error = SynthError::GenerationFailed("not attempted".to_string());

        for attempt in 0..2u8 {
            if attempt > 0 {
                tokio::time::sleep(self.generation_backoff).await;
            }

            let generator = Arc::clone(&self.generator);
            let question_owned = question.to_string();
            let context_owned = context.map(str::to_string);
            let schema_owned = schema_summary.to_string();
            // Spawned so an abandoned request lets the in-flight call finish
            // and discard its result instead of tearing it down mid-flight.
            let handle = tokio::spawn(async move {
                generator
                    .generate(&question_owned, context_owned.as_deref(), &schema_owned)
                    .await
            });

            let started = Instant::now();
            let outcome = tokio::time::timeout(self.generation_timeout, handle).await;
            attempts_ms.push(started.elapsed().as_millis() as u64);

            match outcome {
                Err(_) => {
                    warn!(attempt, "generation attempt timed out");
                    last_error = SynthError::GenerationTimeout;
                }
                Ok(Err(join_error)) => {
                    last_error = SynthError::GenerationFailed(join_error.to_string());
                }
                Ok(Ok(Err(gen_error))) => {
                    warn!(attempt, error = %gen_error, "generation attempt failed");
                    last_error = SynthError::GenerationFailed(gen_error.to_string());
                }
                Ok(Ok(Ok(raw_sql))) => {
                    let cleaned = raw_sql.replace('`', "");
                    debug!(sql = %cleaned, "generation backend returned candidate query");
                    return match self.validator.validate(&cleaned) {
                        Ok(final_sql) => Ok(Synthesis {
                            plan: QueryPlan {
                                sql: final_sql,
                                bindings: BTreeMap::new(),
                                risk: RiskClass::Generated,
                            },
                            intent: Intent::generated(top_confidence),
                            generation_attempts_ms: attempts_ms,
                        }),
                        // Unsafe output is discarded, never retried: the
                        // backend answered, it just answered badly.
                        Err(reason) => Err(SynthFailure {
                            error: SynthError::ValidationFailed(reason),
                            intent: Some(Intent::generated(top_confidence)),
                            generation_attempts_ms: attempts_ms,
                        }),
                    };
                }
            }
        }

        Err(SynthFailure {
            error: last_error,
            intent: Some(Intent::generated(top_confidence)),
            generation_attempts_ms: attempts_ms,
        })
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
