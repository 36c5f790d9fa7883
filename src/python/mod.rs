mod executor;
mod interpreter;

pub use executor::{CodeExecutor, ExecError, PythonExecutor, RunReport, STATIC_URL_PREFIX};
pub use interpreter::{ExceptionInfo, PythonSession, SnippetOutcome, TableInfo};

#[cfg(test)]
pub(crate) use interpreter::tests::sample_session;
