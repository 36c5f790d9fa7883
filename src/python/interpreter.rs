use anyhow::{Result, anyhow, bail};
use pyo3::prelude::*;
use pyo3::types::PyModuleMethods;
use pyo3::types::{PyAnyMethods, PyDict, PyDictMethods, PyModule};
use std::ffi::CString;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub exc_type: String,
    pub message: String,
    pub traceback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub rows: usize,
    pub columns: Vec<String>,
}

/// Result of running one generated snippet against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnippetOutcome {
    Completed {
        output: String,
    },
    Failed {
        output: String,
        exception: ExceptionInfo,
    },
}

/// Embedded interpreter handle. Each session owns a private helper module, so
/// table state is never shared between sessions.
pub struct PythonSession {
    runtime_module: Py<PyModule>,
}

impl PythonSession {
    pub fn initialize() -> Result<Self> {
        Python::attach(|py| -> Result<Self> {
            let runtime_module = PyModule::new(py, "tablechat_runtime")?;
            Self::install_runtime_helpers(py, &runtime_module)?;
            Self::health_check(py, &runtime_module)?;

            Ok(Self {
                runtime_module: runtime_module.unbind(),
            })
        })
    }

    pub fn has_module(&self, name: &str) -> Result<bool> {
        Python::attach(|py| -> Result<bool> {
            let runtime = self.runtime_module.bind(py);
            let result = Self::call_runtime_helper(runtime, "_tablechat_has_module", (name,))?;
            Ok(result.extract()?)
        })
    }

    pub fn load_table(&self, path: &Path) -> Result<TableInfo> {
        let path_text = path.to_string_lossy().into_owned();
        Python::attach(|py| -> Result<TableInfo> {
            let runtime = self.runtime_module.bind(py);
            let result =
                Self::call_runtime_helper(runtime, "_tablechat_load_table", (path_text.as_str(),))?;
            if !Self::result_ok(&result)? {
                let exception = Self::dict_exception(&result)?;
                bail!(
                    "Failed to load table {}: {}: {}",
                    path.display(),
                    exception.exc_type,
                    exception.message
                );
            }

            let dict = Self::cast_dict(&result)?;
            Ok(TableInfo {
                rows: dict
                    .get_item("rows")?
                    .ok_or_else(|| anyhow!("missing rows in helper result"))?
                    .extract()?,
                columns: dict
                    .get_item("columns")?
                    .ok_or_else(|| anyhow!("missing columns in helper result"))?
                    .extract()?,
            })
        })
    }

    /// Column list followed by per-column dtypes, as shown to the model.
    pub fn describe_table(&self) -> Result<String> {
        Python::attach(|py| -> Result<String> {
            let runtime = self.runtime_module.bind(py);
            let result = Self::call_runtime_helper(runtime, "_tablechat_describe_table", ())?;
            if !Self::result_ok(&result)? {
                let exception = Self::dict_exception(&result)?;
                bail!("{}: {}", exception.exc_type, exception.message);
            }
            Self::dict_string(&result, "summary")
        })
    }

    pub fn run_snippet(&self, code: &str, plot_dir: &Path, run_id: &str) -> Result<SnippetOutcome> {
        let plot_dir = plot_dir.to_string_lossy().into_owned();
        Python::attach(|py| -> Result<SnippetOutcome> {
            let runtime = self.runtime_module.bind(py);
            let result = Self::call_runtime_helper(
                runtime,
                "_tablechat_run_snippet",
                (code, plot_dir.as_str(), run_id),
            )?;
            let output = Self::dict_string(&result, "output")?;
            if Self::result_ok(&result)? {
                Ok(SnippetOutcome::Completed { output })
            } else {
                Ok(SnippetOutcome::Failed {
                    output,
                    exception: Self::dict_exception(&result)?,
                })
            }
        })
    }

    fn health_check(py: Python<'_>, module: &Bound<'_, PyModule>) -> PyResult<()> {
        let globals = module.dict();
        let _ = py.eval(c"1 + 1", Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn install_runtime_helpers(py: Python<'_>, module: &Bound<'_, PyModule>) -> Result<()> {
        let globals = module.dict();
        let helper_code = CString::new(include_str!("runtime_helpers.py"))?;
        py.run(helper_code.as_c_str(), Some(&globals), Some(&globals))?;
        Ok(())
    }

    fn call_runtime_helper<'py, A>(
        module: &Bound<'py, PyModule>,
        helper_name: &str,
        args: A,
    ) -> Result<Bound<'py, pyo3::types::PyAny>>
    where
        A: pyo3::call::PyCallArgs<'py>,
    {
        let helper = module.getattr(helper_name)?;
        let result = helper.call1(args)?;
        Ok(result)
    }

    fn result_ok(result: &Bound<'_, pyo3::types::PyAny>) -> Result<bool> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item("ok")?
            .ok_or_else(|| anyhow!("missing ok in helper result"))?
            .extract()?)
    }

    fn dict_string(result: &Bound<'_, pyo3::types::PyAny>, key: &str) -> Result<String> {
        let dict = Self::cast_dict(result)?;
        Ok(dict
            .get_item(key)?
            .ok_or_else(|| anyhow!("missing {key} in helper result"))?
            .extract()?)
    }

    fn dict_exception(result: &Bound<'_, pyo3::types::PyAny>) -> Result<ExceptionInfo> {
        let dict = Self::cast_dict(result)?;
        let exception = dict
            .get_item("exception")?
            .ok_or_else(|| anyhow!("missing exception in helper result"))?;
        Self::any_to_exception(exception)
    }

    fn any_to_exception(exception: Bound<'_, pyo3::types::PyAny>) -> Result<ExceptionInfo> {
        let dict = Self::cast_dict(&exception)?;
        Ok(ExceptionInfo {
            exc_type: dict
                .get_item("exc_type")?
                .ok_or_else(|| anyhow!("missing exc_type"))?
                .extract()?,
            message: dict
                .get_item("message")?
                .ok_or_else(|| anyhow!("missing message"))?
                .extract()?,
            traceback: dict
                .get_item("traceback")?
                .ok_or_else(|| anyhow!("missing traceback"))?
                .extract()?,
        })
    }

    fn cast_dict<'a>(value: &'a Bound<'a, pyo3::types::PyAny>) -> Result<&'a Bound<'a, PyDict>> {
        value
            .cast::<PyDict>()
            .map_err(|err| anyhow!(err.to_string()))
    }
}
