//! Chart selection: a deterministic decision table over the shape of the
//! result set, with explicit user requests honored when structurally
//! compatible.

use crate::intent::{Intent, ParamValue};
use crate::patterns::PatternLibrary;
use crate::store::{ResultSet, SemanticType};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const TOP_N_BUCKET: u32 = 10;
const BAR_ROW_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFamily {
    Bar,
    Line,
    Pie,
    Scatter,
    Heatmap,
    Histogram,
    Area,
}

impl ChartFamily {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bar" => Some(ChartFamily::Bar),
            "line" => Some(ChartFamily::Line),
            "pie" => Some(ChartFamily::Pie),
            "scatter" => Some(ChartFamily::Scatter),
            "heatmap" => Some(ChartFamily::Heatmap),
            "histogram" => Some(ChartFamily::Histogram),
            "area" => Some(ChartFamily::Area),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Encoding {
    pub column: String,
    pub semantic: SemanticType,
}

/// Rendering hints for the presentation layer; drawing happens there.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RenderHints {
    pub sort_by_value_desc: bool,
    pub temporal_ascending: bool,
    /// Keep only the N largest categories and aggregate the rest.
    pub top_n: Option<u32>,
    pub others_bucket: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartSpec {
    pub chart_family: ChartFamily,
    pub x: Option<Encoding>,
    pub y: Option<Encoding>,
    pub series: Option<Encoding>,
    pub title: String,
    pub hints: RenderHints,
    pub warnings: Vec<String>,
}

/// Exactly one chart, or an explicit no-visualization marker.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VizOutcome {
    Chart(ChartSpec),
    NoVisualization { reason: String },
}

pub struct VisualizationSelector {
    library: Arc<PatternLibrary>,
}

struct Shape<'a> {
    numeric: Vec<&'a str>,
    categorical: Vec<&'a str>,
    temporal: Vec<&'a str>,
    rows: usize,
    columns: usize,
}

impl VisualizationSelector {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library }
    }

    /// Pure function of (result shape, intent): identical inputs always
    /// produce the identical outcome.
    pub fn select(&self, result: &ResultSet, intent: &Intent) -> VizOutcome {
        let shape = Shape::of(result);
        let title = self.title_for(intent);
        let structural = structural_choice(&shape, &title);

        let requested = intent
            .parameters
            .get("chart")
            .and_then(ParamValue::as_text)
            .and_then(ChartFamily::parse);

        let outcome = match requested {
            Some(family) => honor_request(family, &shape, &title, structural),
            None => structural,
        };

        if let VizOutcome::Chart(spec) = &outcome {
            debug!(family = ?spec.chart_family, title = %spec.title, "selected chart");
        }
        outcome
    }

    fn title_for(&self, intent: &Intent) -> String {
        match self.library.get(&intent.pattern_id) {
            Some(pattern) => {
                let mut title = pattern.title.to_string();
                for (name, value) in &intent.parameters {
                    let rendered = match value {
                        ParamValue::Int(v) => v.to_string(),
                        ParamValue::Text(v) => v.clone(),
                    };
                    title = title.replace(&format!("{{{}}}", name), &rendered);
                }
                // slots that fell back to their default still need filling
                for slot in pattern.slots {
                    if let Some(default) = slot.default {
                        title = title.replace(&format!("{{{}}}", slot.name), default);
                    }
                }
                title
            }
            None => "Ad hoc query".to_string(),
        }
    }
}

impl<'a> Shape<'a> {
    fn of(result: &'a ResultSet) -> Self {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        let mut temporal = Vec::new();
        for col in &result.columns {
            match col.semantic {
                SemanticType::Numeric => numeric.push(col.name.as_str()),
                SemanticType::Categorical => categorical.push(col.name.as_str()),
                SemanticType::Temporal => temporal.push(col.name.as_str()),
                SemanticType::Text => categorical.push(col.name.as_str()),
            }
        }
        Self {
            numeric,
            categorical,
            temporal,
            rows: result.row_count,
            columns: result.columns.len(),
        }
    }

    fn is_square_numeric_matrix(&self) -> bool {
        self.categorical.is_empty()
            && self.temporal.is_empty()
            && self.columns >= 2
            && self.numeric.len() == self.columns
            && self.rows == self.columns
    }
}

fn encoding(column: &str, semantic: SemanticType) -> Option<Encoding> {
    Some(Encoding {
        column: column.to_string(),
        semantic,
    })
}

/// Rules 1-6, evaluated in order, first match wins.
fn structural_choice(shape: &Shape, title: &str) -> VizOutcome {
    // 1. scalar answer
    if shape.rows == 1 && shape.columns == 1 && shape.numeric.len() == 1 {
        return VizOutcome::NoVisualization {
            reason: "single numeric value, rendered as text".to_string(),
        };
    }

    // 2/4. one categorical dimension with numeric measures
    if shape.categorical.len() == 1 && !shape.numeric.is_empty() && shape.temporal.is_empty() {
        let mut spec = ChartSpec {
            chart_family: ChartFamily::Bar,
            x: encoding(shape.categorical[0], SemanticType::Categorical),
            y: encoding(shape.numeric[0], SemanticType::Numeric),
            series: secondary_numeric(shape),
            title: title.to_string(),
            hints: RenderHints {
                sort_by_value_desc: true,
                ..RenderHints::default()
            },
            warnings: Vec::new(),
        };
        if shape.rows > BAR_ROW_LIMIT {
            spec.hints.top_n = Some(TOP_N_BUCKET);
            spec.hints.others_bucket = true;
        }
        return VizOutcome::Chart(spec);
    }

    // 3. temporal axis
    if shape.temporal.len() == 1 && !shape.numeric.is_empty() && shape.categorical.is_empty() {
        return VizOutcome::Chart(ChartSpec {
            chart_family: ChartFamily::Line,
            x: encoding(shape.temporal[0], SemanticType::Temporal),
            y: encoding(shape.numeric[0], SemanticType::Numeric),
            series: secondary_numeric(shape),
            title: title.to_string(),
            hints: RenderHints {
                temporal_ascending: true,
                ..RenderHints::default()
            },
            warnings: Vec::new(),
        });
    }

    // 5. two measures against each other
    if shape.numeric.len() == 2
        && shape.categorical.is_empty()
        && shape.temporal.is_empty()
        && shape.rows > 1
    {
        return VizOutcome::Chart(ChartSpec {
            chart_family: ChartFamily::Scatter,
            x: encoding(shape.numeric[0], SemanticType::Numeric),
            y: encoding(shape.numeric[1], SemanticType::Numeric),
            series: None,
            title: title.to_string(),
            hints: RenderHints::default(),
            warnings: Vec::new(),
        });
    }

    // 6. correlation-style square matrix
    if shape.is_square_numeric_matrix() {
        return VizOutcome::Chart(ChartSpec {
            chart_family: ChartFamily::Heatmap,
            x: None,
            y: None,
            series: None,
            title: title.to_string(),
            hints: RenderHints::default(),
            warnings: Vec::new(),
        });
    }

    VizOutcome::NoVisualization {
        reason: "no chart rule matched the result shape".to_string(),
    }
}

fn secondary_numeric(shape: &Shape) -> Option<Encoding> {
    shape
        .numeric
        .get(1)
        .copied()
        .and_then(|col| encoding(col, SemanticType::Numeric))
}

/// Rule 7: an explicitly requested family wins when the result shape
/// supports it; otherwise the structural choice stands and a warning is
/// recorded, never a hard failure.
fn honor_request(
    family: ChartFamily,
    shape: &Shape,
    title: &str,
    structural: VizOutcome,
) -> VizOutcome {
    // Asking for what the structural rules already chose keeps their hints.
    if let VizOutcome::Chart(spec) = &structural {
        if spec.chart_family == family {
            return structural;
        }
    }

    let compatible = match family {
        ChartFamily::Pie => shape.categorical.len() == 1 && shape.numeric.len() == 1,
        ChartFamily::Bar => shape.categorical.len() == 1 && !shape.numeric.is_empty(),
        ChartFamily::Line | ChartFamily::Area => {
            shape.temporal.len() == 1 && !shape.numeric.is_empty()
        }
        ChartFamily::Scatter => shape.numeric.len() >= 2,
        ChartFamily::Heatmap => shape.is_square_numeric_matrix(),
        ChartFamily::Histogram => !shape.numeric.is_empty() && shape.rows > 1,
    };

    if !compatible {
        let warning = format!(
            "requested {:?} chart is incompatible with the result shape",
            family
        );
        return match structural {
            VizOutcome::Chart(mut spec) => {
                spec.warnings.push(warning);
                VizOutcome::Chart(spec)
            }
            VizOutcome::NoVisualization { reason } => VizOutcome::NoVisualization {
                reason: format!("{} ({})", reason, warning),
            },
        };
    }

    let x = match family {
        ChartFamily::Pie | ChartFamily::Bar => {
            encoding(shape.categorical[0], SemanticType::Categorical)
        }
        ChartFamily::Line | ChartFamily::Area => {
            encoding(shape.temporal[0], SemanticType::Temporal)
        }
        ChartFamily::Scatter | ChartFamily::Histogram => {
            encoding(shape.numeric[0], SemanticType::Numeric)
        }
        ChartFamily::Heatmap => None,
    };
    let y = match family {
        ChartFamily::Pie | ChartFamily::Bar | ChartFamily::Line | ChartFamily::Area => {
            encoding(shape.numeric[0], SemanticType::Numeric)
        }
        ChartFamily::Scatter => encoding(shape.numeric[1], SemanticType::Numeric),
        ChartFamily::Histogram | ChartFamily::Heatmap => None,
    };

    VizOutcome::Chart(ChartSpec {
        chart_family: family,
        x,
        y,
        series: None,
        title: title.to_string(),
        hints: RenderHints {
            sort_by_value_desc: family == ChartFamily::Bar,
            temporal_ascending: matches!(family, ChartFamily::Line | ChartFamily::Area),
            ..RenderHints::default()
        },
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentSource;
    use crate::store::Cell;
    use std::collections::BTreeMap;

    fn selector() -> VisualizationSelector {
        VisualizationSelector::new(Arc::new(PatternLibrary::builtin()))
    }

    fn intent(pattern_id: &str) -> Intent {
        Intent {
            pattern_id: pattern_id.to_string(),
            confidence: 0.9,
            parameters: BTreeMap::new(),
            source: IntentSource::Template,
        }
    }

    fn intent_with_chart(pattern_id: &str, chart: &str) -> Intent {
        let mut i = intent(pattern_id);
        i.parameters
            .insert("chart".to_string(), ParamValue::Text(chart.to_string()));
        i
    }

    fn scalar_result() -> ResultSet {
        ResultSet::from_rows(
            vec!["total_units_sold".to_string()],
            vec![vec![Cell::Int(123456)]],
        )
    }

    fn category_result(rows: usize) -> ResultSet {
        let data = (0..rows)
            .map(|i| vec![Cell::Text(format!("model-{i}")), Cell::Float(100.0 - i as f64)])
            .collect();
        ResultSet::from_rows(
            vec!["model".to_string(), "total_revenue".to_string()],
            data,
        )
    }

    fn yearly_result() -> ResultSet {
        ResultSet::from_rows(
            vec![
                "year".to_string(),
                "total_units_sold".to_string(),
                "total_revenue".to_string(),
            ],
            vec![
                vec![Cell::Int(2022), Cell::Int(100), Cell::Float(1.0)],
                vec![Cell::Int(2023), Cell::Int(110), Cell::Float(1.2)],
                vec![Cell::Int(2024), Cell::Int(120), Cell::Float(1.4)],
            ],
        )
    }

    #[test]
    fn rule_1_scalar_has_no_visualization() {
        let outcome = selector().select(&scalar_result(), &intent("total_sales"));
        assert!(matches!(outcome, VizOutcome::NoVisualization { .. }));
    }

    #[test]
    fn rule_2_small_categorical_gets_sorted_bar() {
        let outcome = selector().select(&category_result(5), &intent("top_n_models"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Bar);
        assert_eq!(spec.x.as_ref().map(|e| e.column.as_str()), Some("model"));
        assert_eq!(
            spec.y.as_ref().map(|e| e.column.as_str()),
            Some("total_revenue")
        );
        assert!(spec.hints.sort_by_value_desc);
        assert!(spec.hints.top_n.is_none());
    }

    #[test]
    fn rule_3_temporal_gets_line() {
        let outcome = selector().select(&yearly_result(), &intent("annual_sales"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Line);
        assert_eq!(spec.x.as_ref().map(|e| e.column.as_str()), Some("year"));
        assert!(spec.hints.temporal_ascending);
        assert_eq!(spec.title, "Sales by year");
    }

    #[test]
    fn rule_4_wide_categorical_gets_top_n_bucket() {
        let outcome = selector().select(&category_result(40), &intent("model_performance"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Bar);
        assert_eq!(spec.hints.top_n, Some(10));
        assert!(spec.hints.others_bucket);
    }

    #[test]
    fn rule_5_two_numerics_get_scatter() {
        let result = ResultSet::from_rows(
            vec!["price_usd".to_string(), "units_sold".to_string()],
            vec![
                vec![Cell::Float(50.0), Cell::Int(10)],
                vec![Cell::Float(60.0), Cell::Int(8)],
                vec![Cell::Float(70.0), Cell::Int(6)],
            ],
        );
        let outcome = selector().select(&result, &intent("freeform"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Scatter);
        assert_eq!(spec.title, "Ad hoc query");
    }

    #[test]
    fn rule_6_square_matrix_gets_heatmap() {
        let result = ResultSet::from_rows(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![
                vec![Cell::Float(1.0), Cell::Float(0.2), Cell::Float(0.3)],
                vec![Cell::Float(0.2), Cell::Float(1.0), Cell::Float(0.5)],
                vec![Cell::Float(0.3), Cell::Float(0.5), Cell::Float(1.0)],
            ],
        );
        let outcome = selector().select(&result, &intent("freeform"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Heatmap);
    }

    #[test]
    fn rule_7_pie_honored_when_compatible() {
        let outcome = selector().select(&category_result(4), &intent_with_chart("top_n_models", "pie"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Pie);
        assert!(spec.warnings.is_empty());
    }

    #[test]
    fn rule_7_incompatible_pie_degrades_with_warning() {
        // a temporal series cannot become a pie; rule 3 decides instead
        let outcome = selector().select(&yearly_result(), &intent_with_chart("annual_sales", "pie"));
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.chart_family, ChartFamily::Line);
        assert_eq!(spec.warnings.len(), 1);
    }

    #[test]
    fn selection_is_deterministic() {
        let a = selector().select(&yearly_result(), &intent("annual_sales"));
        let b = selector().select(&yearly_result(), &intent("annual_sales"));
        assert_eq!(a, b);
    }

    #[test]
    fn title_substitutes_parameters() {
        let mut i = intent("top_n_models");
        i.parameters.insert("n".to_string(), ParamValue::Int(5));
        let outcome = selector().select(&category_result(5), &i);
        let VizOutcome::Chart(spec) = outcome else {
            panic!("expected a chart");
        };
        assert_eq!(spec.title, "Top 5 models by revenue");
    }
}
