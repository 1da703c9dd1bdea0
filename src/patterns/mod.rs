//! Catalog of recognized query intents.
//!
//! Each pattern is pure data: trigger terms per language, parameter slots,
//! and a SQL template with named placeholders. The classifier never needs to
//! change when a pattern is added or removed; it compiles matchers keyed to
//! the catalog revision.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Pt,
    En,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pt" | "pt-br" | "portuguese" => Some(Language::Pt),
            "en" | "en-us" | "english" => Some(Language::En),
            _ => None,
        }
    }
}

/// What a parameter slot extracts from the question text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// A small integer such as a top-N count.
    Count,
    /// A four-digit calendar year.
    Year,
    /// A sales region, resolved against the known-region lookup.
    Region,
    /// A car model, resolved against the known-model lookup.
    Model,
}

#[derive(Debug, Clone, Copy)]
pub struct SlotDef {
    pub name: &'static str,
    pub kind: SlotKind,
    pub required: bool,
    /// Rendered into the template when the slot is optional and unextracted.
    pub default: Option<&'static str>,
}

/// Trigger terms for one language. Terms are stored pre-normalized
/// (lowercase, diacritics folded). A term with several words hits when every
/// word appears as a token of the normalized question.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSet {
    pub language: Language,
    /// Gate: at least one of these must hit or the pattern is excluded.
    pub keywords: &'static [&'static str],
    /// Scored proportionally; absence never excludes the pattern.
    pub optional: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct PatternDefinition {
    pub id: &'static str,
    /// Display title for chart specs; `{slot}` placeholders are substituted.
    pub title: &'static str,
    pub triggers: &'static [TriggerSet],
    pub slots: &'static [SlotDef],
    /// SQL template; `{slot}` placeholders only, never raw user text.
    pub template: &'static str,
}

impl PatternDefinition {
    pub fn trigger_set(&self, language: Language) -> Option<&TriggerSet> {
        self.triggers.iter().find(|t| t.language == language)
    }

    pub fn required_slots(&self) -> impl Iterator<Item = &SlotDef> {
        self.slots.iter().filter(|s| s.required)
    }
}

/// Process-wide, read-only catalog snapshot.
pub struct PatternLibrary {
    revision: u32,
    patterns: &'static [PatternDefinition],
}

impl PatternLibrary {
    pub fn builtin() -> Self {
        Self {
            revision: 1,
            patterns: BUILTIN_PATTERNS,
        }
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Ordered catalog; position is the deterministic tie-break.
    pub fn lookup(&self) -> &[PatternDefinition] {
        self.patterns
    }

    pub fn get(&self, id: &str) -> Option<&PatternDefinition> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

const N_SLOT: &[SlotDef] = &[SlotDef {
    name: "n",
    kind: SlotKind::Count,
    required: false,
    default: Some("10"),
}];

const REGION_SLOT: &[SlotDef] = &[SlotDef {
    name: "region",
    kind: SlotKind::Region,
    required: true,
    default: None,
}];

const MODEL_SLOT: &[SlotDef] = &[SlotDef {
    name: "model",
    kind: SlotKind::Model,
    required: true,
    default: None,
}];

const YEAR_SLOT: &[SlotDef] = &[SlotDef {
    name: "year",
    kind: SlotKind::Year,
    required: true,
    default: None,
}];

static BUILTIN_PATTERNS: &[PatternDefinition] = &[
    PatternDefinition {
        id: "executive_dashboard",
        title: "Executive dashboard",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["dashboard", "resumo", "visao geral", "panorama"],
                optional: &["executivo", "geral", "principais", "indicadores"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["dashboard", "overview", "kpis"],
                optional: &["executive", "summary", "key", "indicators"],
            },
        ],
        slots: &[],
        template: "SELECT * FROM analytics.kpi_executive_dashboard",
    },
    PatternDefinition {
        id: "annual_sales",
        title: "Sales by year",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["ano", "anos", "anual", "anuais", "por ano"],
                optional: &["vendas", "totais", "receita", "evolucao", "tendencia"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["year", "years", "yearly", "annual", "by year"],
                optional: &["sales", "total", "revenue", "trend"],
            },
        ],
        slots: &[],
        template: "SELECT year, total_units_sold, total_revenue \
                   FROM analytics.kpi_annual_sales ORDER BY year",
    },
    PatternDefinition {
        id: "monthly_trends",
        title: "Monthly sales trend",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["mes", "meses", "mensal", "mensais", "por mes"],
                optional: &["tendencias", "vendas", "sazonal", "evolucao"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["month", "months", "monthly", "by month"],
                optional: &["trends", "sales", "seasonal"],
            },
        ],
        slots: &[],
        template: "SELECT year_month, total_units_sold, total_revenue \
                   FROM analytics.kpi_monthly_trends ORDER BY year_month",
    },
    PatternDefinition {
        id: "annual_growth",
        title: "Annual growth",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["crescimento", "variacao anual"],
                optional: &["anual", "vendas", "receita", "percentual"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["growth", "yoy"],
                optional: &["annual", "sales", "revenue", "percent"],
            },
        ],
        slots: &[],
        template: "SELECT year, total_units_sold, units_growth_pct, total_revenue, \
                   revenue_growth_pct FROM analytics.kpi_annual_growth ORDER BY year",
    },
    PatternDefinition {
        id: "top_n_models",
        title: "Top {n} models by revenue",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &[
                    "top modelos",
                    "melhores modelos",
                    "maiores modelos",
                    "ranking de modelos",
                ],
                optional: &["vendas", "receita"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &[
                    "top models",
                    "best models",
                    "leading models",
                    "model ranking",
                ],
                optional: &["sales", "revenue"],
            },
        ],
        slots: N_SLOT,
        template: "SELECT model, total_revenue, total_units_sold \
                   FROM analytics.kpi_model_performance \
                   ORDER BY total_revenue DESC LIMIT {n}",
    },
    PatternDefinition {
        id: "top_n_regions",
        title: "Top {n} regions by revenue",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &[
                    "top regioes",
                    "melhores regioes",
                    "maiores regioes",
                    "ranking de regioes",
                ],
                optional: &["vendas", "receita"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &[
                    "top regions",
                    "best regions",
                    "leading regions",
                    "region ranking",
                ],
                optional: &["sales", "revenue"],
            },
        ],
        slots: N_SLOT,
        template: "SELECT region, total_revenue, total_units_sold \
                   FROM analytics.kpi_regional_performance \
                   ORDER BY total_revenue DESC LIMIT {n}",
    },
    PatternDefinition {
        id: "model_performance",
        title: "Sales by model",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["por modelo", "por modelos", "modelos"],
                optional: &["vendas", "receita", "desempenho"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["by model", "per model", "models"],
                optional: &["sales", "revenue", "performance"],
            },
        ],
        slots: &[],
        template: "SELECT model, total_units_sold, total_revenue, avg_price \
                   FROM analytics.kpi_model_performance ORDER BY total_revenue DESC",
    },
    PatternDefinition {
        id: "regional_performance",
        title: "Sales by region",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["por regiao", "por regioes", "regioes"],
                optional: &["vendas", "receita", "desempenho", "participacao"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["by region", "per region", "regions"],
                optional: &["sales", "revenue", "performance", "share"],
            },
        ],
        slots: &[],
        template: "SELECT region, total_units_sold, total_revenue, market_share_pct \
                   FROM analytics.kpi_regional_performance ORDER BY total_revenue DESC",
    },
    PatternDefinition {
        id: "region_sales",
        title: "Sales in {region}",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["vendas", "receita"],
                optional: &["unidades", "historico"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["sales", "revenue"],
                optional: &["units", "history"],
            },
        ],
        slots: REGION_SLOT,
        template: "SELECT year, SUM(units_sold) AS total_units_sold, \
                   SUM(revenue) AS total_revenue FROM car_sales \
                   WHERE region = {region} GROUP BY year ORDER BY year",
    },
    PatternDefinition {
        id: "model_sales",
        title: "Sales of {model}",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["vendas", "receita"],
                optional: &["unidades", "historico"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["sales", "revenue"],
                optional: &["units", "history"],
            },
        ],
        slots: MODEL_SLOT,
        template: "SELECT year, SUM(units_sold) AS total_units_sold, \
                   SUM(revenue) AS total_revenue FROM car_sales \
                   WHERE model = {model} GROUP BY year ORDER BY year",
    },
    PatternDefinition {
        id: "sales_in_year",
        title: "Sales by region in {year}",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["vendas", "receita"],
                optional: &["unidades", "regioes"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["sales", "revenue"],
                optional: &["units", "regions"],
            },
        ],
        slots: YEAR_SLOT,
        template: "SELECT region, SUM(units_sold) AS total_units_sold, \
                   SUM(revenue) AS total_revenue FROM car_sales \
                   WHERE year = {year} GROUP BY region ORDER BY total_revenue DESC",
    },
    PatternDefinition {
        id: "total_sales",
        title: "Total units sold",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["vendas totais", "total de vendas", "soma de vendas"],
                optional: &["soma", "geral", "unidades"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["total sales", "overall sales", "sum of sales"],
                optional: &["sum", "overall", "units"],
            },
        ],
        slots: &[],
        template: "SELECT SUM(units_sold) AS total_units_sold FROM car_sales",
    },
    PatternDefinition {
        id: "total_revenue",
        title: "Total revenue",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["receita total", "faturamento"],
                optional: &["soma", "geral"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["total revenue", "overall revenue"],
                optional: &["sum", "overall"],
            },
        ],
        slots: &[],
        template: "SELECT SUM(revenue) AS total_revenue FROM car_sales",
    },
    PatternDefinition {
        id: "average_price",
        title: "Average price",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["preco medio", "media de precos", "media de preco"],
                optional: &["valor", "medio"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &["average price", "mean price", "avg price"],
                optional: &["value", "mean"],
            },
        ],
        slots: &[],
        template: "SELECT AVG(price_usd) AS avg_price FROM car_sales",
    },
    PatternDefinition {
        id: "record_count",
        title: "Record count",
        triggers: &[
            TriggerSet {
                language: Language::Pt,
                keywords: &["quantos registros", "numero de registros", "contagem", "conte"],
                optional: &["registros", "linhas", "total"],
            },
            TriggerSet {
                language: Language::En,
                keywords: &[
                    "how many records",
                    "record count",
                    "count records",
                    "number of records",
                ],
                optional: &["records", "rows", "total"],
            },
        ],
        slots: &[],
        template: "SELECT COUNT(*) AS total_records FROM car_sales",
    },
];
