use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::TableContext;
use crate::llm::provider::{ChatInput, ChatOutput, LlmError, LlmProvider};
use crate::python::{CodeExecutor, RunReport};

/// Replays queued model responses and records every prompt it was given.
#[derive(Clone)]
pub(crate) struct FakeProvider {
    responses: Arc<Mutex<VecDeque<Result<ChatOutput, LlmError>>>>,
    seen_inputs: Arc<Mutex<Vec<ChatInput>>>,
}

impl FakeProvider {
    pub(crate) fn new(responses: Vec<Result<&str, LlmError>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| {
                r.map(|text| ChatOutput {
                    text: text.to_string(),
                })
            })
            .collect();
        Self {
            responses: Arc::new(Mutex::new(responses)),
            seen_inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn seen(&self) -> Vec<ChatInput> {
        self.seen_inputs.lock().expect("lock").clone()
    }
}

impl LlmProvider for FakeProvider {
    async fn generate(&self, input: ChatInput) -> Result<ChatOutput, LlmError> {
        self.seen_inputs.lock().expect("lock").push(input);
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

/// Returns a fixed report and records `(code, run_id)` per call.
#[derive(Clone)]
pub(crate) struct FakeExecutor {
    report: RunReport,
    seen_code: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeExecutor {
    pub(crate) fn new(report: RunReport) -> Self {
        Self {
            report,
            seen_code: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn seen(&self) -> Vec<(String, String)> {
        self.seen_code.lock().expect("lock").clone()
    }
}

impl CodeExecutor for FakeExecutor {
    async fn execute(&self, code: &str, run_id: &str) -> RunReport {
        self.seen_code
            .lock()
            .expect("lock")
            .push((code.to_string(), run_id.to_string()));
        self.report.clone()
    }
}

pub(crate) fn sample_table() -> TableContext {
    TableContext {
        name: "train".to_string(),
        schema: "['Survived', 'Sex']\nSurvived     int64\nSex         object".to_string(),
    }
}
