//! Intent classification: scores the question against the pattern catalog
//! and extracts parameter slots.
//!
//! Classification is a pure function over the catalog snapshot and the
//! lookup context; identical input text always yields the identical ranked
//! list.

pub mod extract;
pub mod normalize;

use crate::config::PipelineConfig;
use crate::patterns::{Language, PatternLibrary, TriggerSet};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub use extract::{LookupContext, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    Template,
    Generated,
}

/// A classified, parameterized interpretation of the question.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Intent {
    pub pattern_id: String,
    pub confidence: f64,
    pub parameters: BTreeMap<String, ParamValue>,
    pub source: IntentSource,
}

impl Intent {
    /// Pseudo-intent recorded when the plan came from the generation
    /// backend instead of the catalog.
    pub fn generated(confidence: f64) -> Self {
        Self {
            pattern_id: "freeform".to_string(),
            confidence,
            parameters: BTreeMap::new(),
            source: IntentSource::Generated,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    pub confidence_floor: f64,
    pub gate_weight: f64,
    pub term_weight: f64,
    pub param_weight: f64,
}

impl From<&PipelineConfig> for ScoringConfig {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            confidence_floor: cfg.confidence_floor,
            gate_weight: cfg.gate_weight,
            term_weight: cfg.term_weight,
            param_weight: cfg.param_weight,
        }
    }
}

pub struct IntentClassifier {
    library: Arc<PatternLibrary>,
    lookup: LookupContext,
    scoring: ScoringConfig,
}

impl IntentClassifier {
    pub fn new(library: Arc<PatternLibrary>, lookup: LookupContext, scoring: ScoringConfig) -> Self {
        Self {
            library,
            lookup,
            scoring,
        }
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Ranked candidate intents, best first. Patterns with no keyword hit
    /// are excluded entirely; a pattern missing a required parameter is
    /// capped below the usable-confidence floor.
    pub fn classify(&self, text: &str, language_hint: Option<Language>) -> Vec<Intent> {
        let normalized = normalize::normalize(text);
        let toks = normalize::tokens(&normalized);
        let chart = extract::extract_chart_family(&toks);

        let mut candidates: Vec<Candidate> = Vec::new();
        for (idx, pattern) in self.library.lookup().iter().enumerate() {
            let sets: Vec<&TriggerSet> = pattern
                .triggers
                .iter()
                .filter(|set| language_hint.is_none_or(|hint| set.language == hint))
                .collect();

            let gated = sets
                .iter()
                .any(|set| set.keywords.iter().any(|kw| normalize::term_hits(kw, &toks)));
            if !gated {
                continue;
            }

            // Proportion of optional terms hit, taking the best language.
            let term_prop = sets
                .iter()
                .map(|set| {
                    if set.optional.is_empty() {
                        0.0
                    } else {
                        let hit = set
                            .optional
                            .iter()
                            .filter(|t| normalize::term_hits(t, &toks))
                            .count();
                        hit as f64 / set.optional.len() as f64
                    }
                })
                .fold(0.0, f64::max);

            let mut parameters = BTreeMap::new();
            let mut satisfied = 0usize;
            let mut required_satisfied = 0usize;
            let mut required_missing = false;
            for slot in pattern.slots {
                match extract::extract_slot(slot.kind, &toks, &self.lookup) {
                    Some(value) => {
                        parameters.insert(slot.name.to_string(), value);
                        satisfied += 1;
                        if slot.required {
                            required_satisfied += 1;
                        }
                    }
                    None if slot.default.is_some() => satisfied += 1,
                    None => {
                        if slot.required {
                            required_missing = true;
                        }
                    }
                }
            }
            let param_prop = if pattern.slots.is_empty() {
                1.0
            } else {
                satisfied as f64 / pattern.slots.len() as f64
            };

            let mut confidence = self.scoring.gate_weight
                + self.scoring.term_weight * term_prop
                + self.scoring.param_weight * param_prop;
            if required_missing {
                // An un-parameterizable match cannot be synthesized.
                confidence = confidence.min(self.scoring.confidence_floor - 0.01);
            }
            let confidence = confidence.clamp(0.0, 1.0);

            if let Some(family) = &chart {
                parameters.insert("chart".to_string(), ParamValue::Text(family.clone()));
            }

            candidates.push(Candidate {
                idx,
                required_satisfied,
                intent: Intent {
                    pattern_id: pattern.id.to_string(),
                    confidence,
                    parameters,
                    source: IntentSource::Template,
                },
            });
        }

        candidates.sort_by(|a, b| {
            b.intent
                .confidence
                .partial_cmp(&a.intent.confidence)
                .unwrap_or(Ordering::Equal)
                .then(b.required_satisfied.cmp(&a.required_satisfied))
                .then(a.idx.cmp(&b.idx))
        });

        let ranked: Vec<Intent> = candidates.into_iter().map(|c| c.intent).collect();
        debug!(
            text,
            candidates = ranked.len(),
            top = ranked.first().map(|i| i.pattern_id.as_str()).unwrap_or("-"),
            "classified question"
        );
        ranked
    }
}

struct Candidate {
    idx: usize,
    required_satisfied: usize,
    intent: Intent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new(
            Arc::new(PatternLibrary::builtin()),
            LookupContext::builtin(),
            ScoringConfig::from(&PipelineConfig::default()),
        )
    }

    fn assert_ranked(intents: &[Intent]) {
        for pair in intents.windows(2) {
            assert!(
                pair[0].confidence >= pair[1].confidence,
                "ranking not non-increasing: {} {} vs {} {}",
                pair[0].pattern_id,
                pair[0].confidence,
                pair[1].pattern_id,
                pair[1].confidence
            );
        }
        for intent in intents {
            assert!((0.0..=1.0).contains(&intent.confidence));
        }
    }

    #[test]
    fn confidence_bounded_and_sorted_for_all_inputs() {
        let clf = classifier();
        for text in [
            "Mostre as vendas totais por ano",
            "Quais são os top 5 modelos por vendas?",
            "total revenue",
            "vendas na Europa",
            "dashboard",
            "sales",
            "quantos registros temos?",
        ] {
            assert_ranked(&clf.classify(text, None));
        }
    }

    #[test]
    fn annual_sales_scenario() {
        let clf = classifier();
        let intents = clf.classify("Mostre as vendas totais por ano", None);
        let top = intents.first().expect("no intents");
        assert_eq!(top.pattern_id, "annual_sales");
        assert!(top.confidence >= 0.5, "confidence {}", top.confidence);
        assert_eq!(top.source, IntentSource::Template);
    }

    #[test]
    fn top_n_models_extracts_count() {
        let clf = classifier();
        let intents = clf.classify("Quais são os top 5 modelos por vendas?", None);
        let top = intents.first().expect("no intents");
        assert_eq!(top.pattern_id, "top_n_models");
        assert!(top.confidence >= 0.5);
        assert_eq!(top.parameters.get("n"), Some(&ParamValue::Int(5)));
    }

    #[test]
    fn missing_required_parameter_caps_confidence() {
        let clf = classifier();
        // Gates region_sales/model_sales/sales_in_year, but no region,
        // model, or year can be extracted.
        let intents = clf.classify("mostre as vendas", None);
        assert!(!intents.is_empty());
        for intent in &intents {
            assert!(
                intent.confidence < 0.5,
                "{} should be capped, got {}",
                intent.pattern_id,
                intent.confidence
            );
        }
    }

    #[test]
    fn extracted_region_clears_the_floor() {
        let clf = classifier();
        let intents = clf.classify("Mostre as vendas na Europa", None);
        let top = intents.first().expect("no intents");
        assert_eq!(top.pattern_id, "region_sales");
        assert!(top.confidence >= 0.5);
        assert_eq!(
            top.parameters.get("region"),
            Some(&ParamValue::Text("Europe".to_string()))
        );
    }

    #[test]
    fn gibberish_matches_nothing() {
        let clf = classifier();
        assert!(clf.classify("xyzzy blorp frobnicate", None).is_empty());
    }

    #[test]
    fn classification_is_idempotent() {
        let clf = classifier();
        let a = clf.classify("Quais são os top 5 modelos por vendas?", None);
        let b = clf.classify("Quais são os top 5 modelos por vendas?", None);
        assert_eq!(a, b);
    }

    #[test]
    fn language_hint_restricts_trigger_sets() {
        let clf = classifier();
        let unhinted = clf.classify("vendas por ano", None);
        assert_eq!(unhinted.first().map(|i| i.pattern_id.as_str()), Some("annual_sales"));
        // With an English hint the Portuguese triggers are not scored.
        let hinted = clf.classify("vendas por ano", Some(Language::En));
        assert!(hinted.is_empty());
    }

    #[test]
    fn explicit_chart_request_is_injected_as_parameter() {
        let clf = classifier();
        let intents = clf.classify("gráfico de barras das vendas por região", None);
        let top = intents.first().expect("no intents");
        assert_eq!(top.pattern_id, "regional_performance");
        assert_eq!(
            top.parameters.get("chart"),
            Some(&ParamValue::Text("bar".to_string()))
        );
    }
}
