pub mod ollama;
pub mod remote;

/// Pulls the SQL statement out of a model reply that may wrap it in
/// markdown fences or surrounding prose.
pub(crate) fn extract_sql(content: &str) -> String {
    if let Some(start) = content.find("```sql") {
        if let Some(end) = content.rfind("```") {
            if end > start + 6 {
                return content[start + 6..end].trim().to_string();
            }
        }
    }

    if let Some(start) = content.find("```") {
        let after = &content[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // No fences: scan for a line that starts a SELECT/WITH statement and
    // collect until the terminating semicolon.
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let upper = line.trim().to_uppercase();
        if upper.starts_with("SELECT") || upper.starts_with("WITH") {
            let mut sql = line.trim().to_string();
            if !sql.ends_with(';') {
                for next in &lines[i + 1..] {
                    let next = next.trim();
                    if next.starts_with("```") {
                        break;
                    }
                    sql.push(' ');
                    sql.push_str(next);
                    if next.ends_with(';') {
                        break;
                    }
                }
            }
            return sql;
        }
    }

    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_sql_fence() {
        let reply = "Here you go:\n```sql\nSELECT 1;\n```\nDone.";
        assert_eq!(extract_sql(reply), "SELECT 1;");
    }

    #[test]
    fn extracts_from_bare_fence() {
        let reply = "```\nSELECT region FROM car_sales;\n```";
        assert_eq!(extract_sql(reply), "SELECT region FROM car_sales;");
    }

    #[test]
    fn collects_unfenced_statement_lines() {
        let reply = "The query is:\nSELECT year,\n  SUM(revenue)\nFROM car_sales GROUP BY year;";
        assert_eq!(
            extract_sql(reply),
            "SELECT year, SUM(revenue) FROM car_sales GROUP BY year;"
        );
    }
}
