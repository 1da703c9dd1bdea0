//! Slot-specific parameter extractors.
//!
//! Enumerated slots resolve against the lookup context of known categorical
//! values so the canonical catalog value, never raw user text, reaches the
//! query template.

use crate::intent::normalize::{normalize, term_hits};
use crate::patterns::SlotKind;
use serde::Serialize;

const YEAR_MIN: i64 = 1900;
const YEAR_MAX: i64 = 2100;

/// Known categorical values loaded from the data store at startup.
#[derive(Debug, Clone)]
pub struct LookupContext {
    regions: Vec<String>,
    models: Vec<String>,
}

impl LookupContext {
    pub fn new(regions: Vec<String>, models: Vec<String>) -> Self {
        Self { regions, models }
    }

    /// Fallback values matching the seed dataset, used when the store
    /// cannot be reached at startup and in tests.
    pub fn builtin() -> Self {
        Self {
            regions: [
                "Asia",
                "Europe",
                "North America",
                "South America",
                "Middle East",
                "Africa",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            models: [
                "3 Series", "5 Series", "7 Series", "X1", "X3", "X5", "i3", "i8", "M3", "Z4",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

/// Extracted slot value; integers for counts and years, canonical catalog
/// text for enumerated values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Int(_) => None,
            ParamValue::Text(v) => Some(v),
        }
    }
}

pub fn extract_slot(kind: SlotKind, toks: &[&str], ctx: &LookupContext) -> Option<ParamValue> {
    match kind {
        SlotKind::Count => extract_count(toks).map(ParamValue::Int),
        SlotKind::Year => extract_year(toks).map(ParamValue::Int),
        SlotKind::Region => extract_enumerated(toks, ctx.regions(), REGION_ALIASES),
        SlotKind::Model => extract_enumerated(toks, ctx.models(), MODEL_ALIASES),
    }
}

/// First small integer token that does not look like a calendar year.
fn extract_count(toks: &[&str]) -> Option<i64> {
    toks.iter()
        .filter_map(|t| t.parse::<i64>().ok())
        .find(|n| (1..=999).contains(n) && !(YEAR_MIN..=YEAR_MAX).contains(n))
}

fn extract_year(toks: &[&str]) -> Option<i64> {
    toks.iter()
        .filter_map(|t| t.parse::<i64>().ok())
        .find(|n| (YEAR_MIN..=YEAR_MAX).contains(n))
}

/// Portuguese aliases for the enumerated values; folded form -> canonical.
const REGION_ALIASES: &[(&str, &str)] = &[
    ("asia", "Asia"),
    ("europa", "Europe"),
    ("africa", "Africa"),
    ("oriente medio", "Middle East"),
    ("america do norte", "North America"),
    ("america do sul", "South America"),
];

const MODEL_ALIASES: &[(&str, &str)] = &[
    ("serie 3", "3 Series"),
    ("serie 5", "5 Series"),
    ("serie 7", "7 Series"),
    ("modelo 3", "3 Series"),
    ("modelo 5", "5 Series"),
    ("modelo 7", "7 Series"),
];

/// Matches known values (catalog order, first hit wins), then aliases. A
/// value hits when every word of its folded form is a token of the text.
fn extract_enumerated(
    toks: &[&str],
    known: &[String],
    aliases: &[(&str, &str)],
) -> Option<ParamValue> {
    for value in known {
        let folded = normalize(value);
        if !folded.is_empty() && term_hits(&folded, toks) {
            return Some(ParamValue::Text(value.clone()));
        }
    }
    for (alias, canonical) in aliases {
        if term_hits(alias, toks) && known.iter().any(|k| k == canonical) {
            return Some(ParamValue::Text((*canonical).to_string()));
        }
    }
    None
}

/// Chart families a user can name explicitly; folded synonym -> family name
/// as understood by the visualization selector.
const CHART_TERMS: &[(&str, &str)] = &[
    ("barra", "bar"),
    ("barras", "bar"),
    ("bar", "bar"),
    ("bars", "bar"),
    ("coluna", "bar"),
    ("colunas", "bar"),
    ("linha", "line"),
    ("linhas", "line"),
    ("line", "line"),
    ("lines", "line"),
    ("tendencia", "line"),
    ("trend", "line"),
    ("pizza", "pie"),
    ("pie", "pie"),
    ("torta", "pie"),
    ("dispersao", "scatter"),
    ("scatter", "scatter"),
    ("correlacao", "scatter"),
    ("correlation", "scatter"),
    ("heatmap", "heatmap"),
    ("matriz", "heatmap"),
    ("mapa de calor", "heatmap"),
    ("histograma", "histogram"),
    ("histogram", "histogram"),
    ("frequencia", "histogram"),
    ("frequency", "histogram"),
    ("area", "area"),
];

pub fn extract_chart_family(toks: &[&str]) -> Option<String> {
    CHART_TERMS
        .iter()
        .find(|(term, _)| term_hits(term, toks))
        .map(|(_, family)| (*family).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::normalize::tokens;

    fn toks(text: &str) -> Vec<String> {
        tokens(&normalize(text))
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn as_refs(owned: &[String]) -> Vec<&str> {
        owned.iter().map(String::as_str).collect()
    }

    #[test]
    fn count_skips_years() {
        let owned = toks("top 5 em 2023");
        let t = as_refs(&owned);
        assert_eq!(extract_count(&t), Some(5));
        assert_eq!(extract_year(&t), Some(2023));
    }

    #[test]
    fn region_resolves_portuguese_alias_to_canonical() {
        let ctx = LookupContext::builtin();
        let owned = toks("vendas na Europa");
        let got = extract_slot(SlotKind::Region, &as_refs(&owned), &ctx);
        assert_eq!(got, Some(ParamValue::Text("Europe".to_string())));
    }

    #[test]
    fn region_matches_multi_word_canonical_value() {
        let ctx = LookupContext::builtin();
        let owned = toks("sales in North America");
        let got = extract_slot(SlotKind::Region, &as_refs(&owned), &ctx);
        assert_eq!(got, Some(ParamValue::Text("North America".to_string())));
    }

    #[test]
    fn model_resolves_portuguese_series_alias() {
        let ctx = LookupContext::builtin();
        let owned = toks("vendas da série 7");
        let got = extract_slot(SlotKind::Model, &as_refs(&owned), &ctx);
        assert_eq!(got, Some(ParamValue::Text("7 Series".to_string())));
    }

    #[test]
    fn unknown_region_is_not_extracted() {
        let ctx = LookupContext::builtin();
        let owned = toks("vendas em Atlantis");
        assert_eq!(extract_slot(SlotKind::Region, &as_refs(&owned), &ctx), None);
    }

    #[test]
    fn chart_family_detected_from_portuguese() {
        let owned = toks("faça um gráfico de pizza das vendas");
        assert_eq!(
            extract_chart_family(&as_refs(&owned)),
            Some("pie".to_string())
        );
    }
}
