use anyhow::{Context, Result};
use uuid::Uuid;

use super::prompt::{
    GREETING_REPLY, IMAGE_NOTE, NO_OUTPUT_PLACEHOLDER, classification_prompt,
    code_generation_prompt, conversational_system_prompt, format_prompt,
};
use super::route::{Route, clean_code, is_greeting, parse_classification};
use crate::llm::provider::{ChatInput, LlmProvider};
use crate::python::CodeExecutor;
use crate::trace::SessionTrace;

/// What the model is told about the loaded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContext {
    pub name: String,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub text: String,
    pub images: Vec<String>,
    pub route: Route,
}

pub struct ChatPipeline<P, E> {
    provider: P,
    executor: E,
    table: TableContext,
    trace: Option<SessionTrace>,
}

impl<P: LlmProvider + Sync, E: CodeExecutor + Sync> ChatPipeline<P, E> {
    pub fn new(provider: P, executor: E, table: TableContext) -> Self {
        Self {
            provider,
            executor,
            table,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub async fn answer(&self, question: &str) -> Result<ChatAnswer> {
        let run_id = new_run_id();
        let question = question.trim();
        if let Some(trace) = &self.trace {
            trace.log_question(&run_id, question);
        }

        let route = self.route(question).await?;
        if let Some(trace) = &self.trace {
            trace.log_route(&run_id, route.as_str());
        }
        tracing::info!(run_id = %run_id, route = route.as_str(), "routing question");

        let answer = match route {
            Route::Greeting => ChatAnswer {
                text: GREETING_REPLY.to_string(),
                images: Vec::new(),
                route,
            },
            Route::Conversational => ChatAnswer {
                text: self.converse(question).await?,
                images: Vec::new(),
                route,
            },
            Route::Data => self.analyze(question, &run_id).await?,
        };

        if let Some(trace) = &self.trace {
            trace.log_answer(&run_id, &answer.text);
        }
        Ok(answer)
    }

    async fn route(&self, question: &str) -> Result<Route> {
        if is_greeting(question) {
            return Ok(Route::Greeting);
        }

        let verdict = self
            .provider
            .generate(ChatInput::user(classification_prompt(
                &self.table.schema,
                question,
            )))
            .await
            .context("classification request failed")?;
        Ok(parse_classification(&verdict.text))
    }

    async fn converse(&self, question: &str) -> Result<String> {
        let output = self
            .provider
            .generate(
                ChatInput::user(question).with_system(conversational_system_prompt(
                    &self.table.name,
                    &self.table.schema,
                )),
            )
            .await
            .context("conversational request failed")?;
        Ok(output.text)
    }

    async fn analyze(&self, question: &str, run_id: &str) -> Result<ChatAnswer> {
        let generated = self
            .provider
            .generate(ChatInput::user(code_generation_prompt(
                &self.table.schema,
                question,
            )))
            .await
            .context("code generation request failed")?;
        let code = clean_code(&generated.text);
        if let Some(trace) = &self.trace {
            trace.log_code(run_id, &code);
        }

        let report = self.executor.execute(&code, run_id).await;
        if let Some(failure) = &report.failure {
            tracing::warn!(run_id = %run_id, "generated code failed: {failure}");
        }
        let result = report.result_text();
        if let Some(trace) = &self.trace {
            trace.log_run_output(run_id, &result, &report.images);
        }

        let result = if result.trim().is_empty() {
            NO_OUTPUT_PLACEHOLDER
        } else {
            result.as_str()
        };
        let image_note = if report.images.is_empty() {
            ""
        } else {
            IMAGE_NOTE
        };

        let formatted = self
            .provider
            .generate(ChatInput::user(format_prompt(question, result, image_note)))
            .await
            .context("answer formatting request failed")?;

        Ok(ChatAnswer {
            text: formatted.text,
            images: report.images,
            route: Route::Data,
        })
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
