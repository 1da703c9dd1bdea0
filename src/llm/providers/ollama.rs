use crate::config::LlmConfig;
use crate::llm::{GenerationError, QueryGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(flatten)]
    _extra: std::collections::HashMap<String, serde_json::Value>,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_url,
            model: config.model.clone(),
        })
    }

    fn prepare_prompt(&self, question: &str, context: Option<&str>, schema_summary: &str) -> String {
        format!(
            r#"
### Instructions:
Your task is to convert an analytics question into a single read-only SQL query for DuckDB, given the sales database schema.
Adhere to these rules:
- **Produce exactly one SELECT statement** - never INSERT, UPDATE, DELETE, or DDL
- **Only reference the tables and views listed in the schema**
- **Be careful with column names - they are case sensitive**
- Questions may be phrased in Portuguese or English
- End your query with a semicolon

### Input:
Generate a SQL query that answers the question `{}`.
Additional context: {}
This query will run on a DuckDB database with the following tables and columns:

{}

### Response:
```sql
"#,
            question,
            context.unwrap_or("none"),
            schema_summary
        )
    }
}

#[async_trait]
impl QueryGenerator for OllamaProvider {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        schema_summary: &str,
    ) -> Result<String, GenerationError> {
        let prompt = self.prepare_prompt(question, context, schema_summary);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt,
            temperature: 0.1,
            stream: false,
        };

        debug!(api_url = %self.api_url, model = %self.model, "sending generation request");

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Ollama API responded with status {}: {}", status, error_body);
            return Err(GenerationError::ResponseError(format!(
                "Ollama API responded with status code: {} {}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::ResponseError(format!("Failed to read body: {}", e)))?;

        let ollama_response: OllamaResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                GenerationError::ResponseError(format!(
                    "Failed to parse Ollama response: {} - body was: {}",
                    e, response_text
                ))
            })?;

        let sql = super::extract_sql(&ollama_response.response);
        if sql.trim().is_empty() {
            return Err(GenerationError::ResponseError(
                "Failed to extract SQL from response".to_string(),
            ));
        }

        Ok(sql)
    }
}
