use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::interpreter::{ExceptionInfo, PythonSession, SnippetOutcome};

/// URL path under which the plot directory is served.
pub const STATIC_URL_PREFIX: &str = "/static";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    PythonException(ExceptionInfo),
    Internal(String),
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PythonException(exc) => write!(f, "{}: {}", exc.exc_type, exc.message),
            Self::Internal(msg) => write!(f, "internal execution error: {msg}"),
        }
    }
}

impl Error for ExecError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub output: String,
    pub failure: Option<ExecError>,
    /// URL paths of the images this run created.
    pub images: Vec<String>,
}

impl RunReport {
    pub fn failed(failure: ExecError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Text handed to the formatting prompt. Failures read as `Error: ...`.
    pub fn result_text(&self) -> String {
        match &self.failure {
            None => self.output.clone(),
            Some(err) if self.output.trim().is_empty() => format!("Error: {err}"),
            Some(err) => format!("{}\nError: {err}", self.output.trim_end()),
        }
    }
}

/// Runs generated code against the table. Never fails: problems are reported
/// inside the [`RunReport`].
pub trait CodeExecutor {
    fn execute(&self, code: &str, run_id: &str) -> impl Future<Output = RunReport> + Send;
}

#[derive(Clone)]
pub struct PythonExecutor {
    session: Arc<PythonSession>,
    plot_dir: PathBuf,
    run_lock: Arc<Mutex<()>>,
}

impl PythonExecutor {
    pub fn new(session: Arc<PythonSession>, plot_dir: PathBuf) -> Self {
        Self {
            session,
            plot_dir,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    fn run_blocking(&self, code: &str, run_id: &str) -> RunReport {
        // pyplot keeps process-wide figure state, so runs never overlap.
        let _guard = self.run_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = self.session.run_snippet(code, &self.plot_dir, run_id);
        let images = collect_run_images(&self.plot_dir, run_id);

        match outcome {
            Ok(SnippetOutcome::Completed { output }) => RunReport {
                output,
                failure: None,
                images,
            },
            Ok(SnippetOutcome::Failed { output, exception }) => RunReport {
                output,
                failure: Some(ExecError::PythonException(exception)),
                images,
            },
            Err(err) => RunReport {
                output: String::new(),
                failure: Some(ExecError::Internal(format!("{err:#}"))),
                images,
            },
        }
    }
}

impl CodeExecutor for PythonExecutor {
    async fn execute(&self, code: &str, run_id: &str) -> RunReport {
        let executor = self.clone();
        let code = code.to_string();
        let run_id = run_id.to_string();

        match tokio::task::spawn_blocking(move || executor.run_blocking(&code, &run_id)).await {
            Ok(report) => report,
            Err(err) => RunReport::failed(ExecError::Internal(format!(
                "execution task failed: {err}"
            ))),
        }
    }
}

/// Lists the plot files written by one run, ordered by their sequence number.
pub(crate) fn collect_run_images(plot_dir: &Path, run_id: &str) -> Vec<String> {
    let prefix = format!("plot_{run_id}_");
    let entries = match fs::read_dir(plot_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(plot_dir = %plot_dir.display(), "failed to list plot directory: {err}");
            return Vec::new();
        }
    };

    let mut found: Vec<(u32, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| {
            let sequence = name
                .strip_prefix(&prefix)?
                .strip_suffix(".png")?
                .parse::<u32>()
                .ok()?;
            Some((sequence, name))
        })
        .collect();
    found.sort();

    found
        .into_iter()
        .map(|(_, name)| format!("{STATIC_URL_PREFIX}/{name}"))
        .collect()
}
