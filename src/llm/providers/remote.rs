use crate::config::LlmConfig;
use crate::llm::{GenerationError, QueryGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat-completions backend.
pub struct RemoteProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            GenerationError::ConfigError("API URL is required for the remote backend".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            GenerationError::ConfigError("API key is required for the remote backend".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }

    fn prepare_prompt(&self, question: &str, context: Option<&str>, schema_summary: &str) -> String {
        format!(
            r#"
### Instructions:
Your task is to convert an analytics question into a single read-only SQL query, given the sales database schema.
Adhere to these rules:
- **Produce exactly one SELECT statement** - never INSERT, UPDATE, DELETE, or DDL
- **Only reference the tables and views listed in the schema**
- **Deliberately go through the question and database schema word by word** to appropriately answer the question
- Questions may be phrased in Portuguese or English
- When creating a ratio, always cast the numerator as float

### Input:
Generate a SQL query that answers the question `{}`.
Additional context: {}
This query will run on a database whose schema is represented in this string:
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
impl QueryGenerator for RemoteProvider {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        schema_summary: &str,
    ) -> Result<String, GenerationError> {
        let prompt = self.prepare_prompt(question, context, schema_summary);

        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: 0.1,
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ResponseError(e.to_string()))?;

        let content = prompt_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerationError::ResponseError("No choices in response".to_string()))?;

        Ok(super::extract_sql(content))
    }
}
