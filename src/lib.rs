pub mod cli;
pub mod config;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod python;
pub mod server;
pub mod trace;

use anyhow::{Context, Result, anyhow};
use cli::{BackendClient, ChatSession, CliArgs, CliCommand, Palette, run_chat};
use config::AppConfig;
use http::client::HttpClient;
use http::debug::HttpDebugConfig;
use llm::openai::OpenAiCompatProvider;
use pipeline::{ChatPipeline, TableContext};
use python::{PythonExecutor, PythonSession};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use trace::SessionTrace;
use tracing_subscriber::EnvFilter;

pub async fn run(args: CliArgs) -> Result<()> {
    let config = if let Some(path) = args.config.as_deref() {
        AppConfig::load_with_path(Some(path))?
    } else {
        AppConfig::load()?
    };

    match args.command {
        CliCommand::Serve {
            bind,
            data,
            static_dir,
        } => {
            init_logging("info");
            let config = apply_serve_overrides(config, bind, data, static_dir);
            serve(&config, args.verbose).await
        }
        CliCommand::Chat { backend } => {
            init_logging("warn");
            let backend = backend.unwrap_or_else(|| config.backend_url.clone());
            chat(&backend).await
        }
    }
}

async fn serve(config: &AppConfig, verbose: bool) -> Result<()> {
    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;
    let http = HttpClient::new(reqwest::Client::new(), HttpDebugConfig::from_verbose(verbose))
        .with_trace(trace.clone());
    let provider = OpenAiCompatProvider::new(
        http,
        config.api_key.clone(),
        config.model.clone(),
        config.base_url.clone(),
        config.temperature,
    )
    .map_err(|err| {
        anyhow!(
            "Backend unavailable: {err}. Configure it in your shell or .env file (example: OPENAI_API_KEY=your_key)"
        )
    })?;

    fs::create_dir_all(&config.static_dir).with_context(|| {
        format!(
            "Failed to create static directory {}",
            config.static_dir.display()
        )
    })?;

    let python = PythonSession::initialize()?;
    let table = python.load_table(&config.data_path)?;
    let schema = python.describe_table()?;
    tracing::info!(
        data = %config.data_path.display(),
        rows = table.rows,
        columns = table.columns.len(),
        "table loaded"
    );

    let executor = PythonExecutor::new(Arc::new(python), config.static_dir.clone());
    let context = TableContext {
        name: dataset_name(&config.data_path),
        schema,
    };
    let pipeline = ChatPipeline::new(provider, executor, context).with_trace(trace.clone());
    tracing::info!(
        model = %config.model,
        trace = %trace.file_path().display(),
        "session {session_id} ready"
    );

    let app = server::router(Arc::new(pipeline), &config.static_dir);
    server::serve(&config.bind_addr, app).await
}

async fn chat(backend: &str) -> Result<()> {
    let client = BackendClient::new(reqwest::Client::new(), backend)?;
    let mut session = ChatSession::new(client);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = std::io::stdout();
    let palette = Palette::new(stdout.is_terminal() && std::env::var_os("NO_COLOR").is_none());

    run_chat(&mut session, stdin, &mut stdout.lock(), palette).await
}

fn apply_serve_overrides(
    mut config: AppConfig,
    bind: Option<String>,
    data: Option<PathBuf>,
    static_dir: Option<PathBuf>,
) -> AppConfig {
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(data) = data {
        config.data_path = data;
    }
    if let Some(static_dir) = static_dir {
        config.static_dir = static_dir;
    }
    config
}

/// Name the model uses for the table: the containing directory when there is
/// one, otherwise the file stem.
fn dataset_name(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .or_else(|| path.file_stem())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::{apply_serve_overrides, dataset_name, generate_session_id};
    use crate::config::AppConfig;
    use std::path::{Path, PathBuf};

    fn base_config() -> AppConfig {
        AppConfig {
            config_path: PathBuf::from("config.toml"),
            config_is_explicit: false,
            api_key: None,
            model: "model".to_string(),
            base_url: "https://example.com".to_string(),
            temperature: 0.0,
            data_path: PathBuf::from("titanic/train.csv"),
            static_dir: PathBuf::from("static"),
            bind_addr: "0.0.0.0:8000".to_string(),
            backend_url: "http://127.0.0.1:8000".to_string(),
        }
    }

    #[test]
    fn generated_session_id_has_expected_shape() {
        let session_id = generate_session_id();
        let mut parts = session_id.split('-');
        let ts = parts.next().expect("timestamp segment");
        let pid = parts.next().expect("pid segment");
        assert!(
            parts.next().is_none(),
            "session id should contain one delimiter"
        );
        assert!(
            ts.chars().all(|ch| ch.is_ascii_hexdigit()),
            "timestamp segment should be hex"
        );
        assert!(
            pid.chars().all(|ch| ch.is_ascii_hexdigit()),
            "pid segment should be hex"
        );
    }

    #[test]
    fn serve_flags_override_config() {
        let config = apply_serve_overrides(
            base_config(),
            Some("127.0.0.1:9000".to_string()),
            None,
            Some(PathBuf::from("/tmp/plots")),
        );
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.data_path, PathBuf::from("titanic/train.csv"));
        assert_eq!(config.static_dir, PathBuf::from("/tmp/plots"));
    }

    #[test]
    fn dataset_name_prefers_directory() {
        assert_eq!(dataset_name(Path::new("titanic/train.csv")), "titanic");
        assert_eq!(dataset_name(Path::new("people.csv")), "people");
    }
}
