use anyhow::{Context, Result};
use crossterm::style::Stylize;
use crossterm::{cursor, queue, terminal};
use reqwest::Url;
use serde_json::Value;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::commands::{Command, HELP_TEXT, is_command_line, is_exit_word, parse_command};
use crate::server::ChatRequest;

pub(crate) const NO_RESPONSE_TEXT: &str = "Sorry, I didn't get a response.";
const USER_PROMPT: &str = "you> ";
const ASSISTANT_LABEL: &str = "assistant> ";
const BANNER: &str =
    "Tablechat: ask questions about the dataset and get answers, charts and insights.";
const EXAMPLE_HINT: &str = "E.g., What was the survival rate by gender? (/help for commands)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    /// Image paths exactly as the backend returned them.
    pub images: Vec<String>,
}

impl ChatTurn {
    fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            images: Vec::new(),
        }
    }

    fn assistant(text: String, images: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            text,
            images,
        }
    }
}

/// Talks to the `/chat` endpoint. Failures come back as displayable text.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    display_url: String,
}

impl BackendClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Result<Self> {
        let display_url = base_url.trim_end_matches('/').to_string();
        let base_url = Url::parse(&format!("{display_url}/"))
            .with_context(|| format!("Invalid backend URL {base_url}"))?;
        Ok(Self {
            http,
            base_url,
            display_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.display_url
    }

    fn chat_url(&self) -> String {
        format!("{}/chat", self.display_url)
    }

    /// Resolves an image path from a reply against the backend URL.
    pub fn image_url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| path.to_string())
    }

    pub async fn ask(&self, question: &str) -> ChatTurn {
        match self.try_ask(question).await {
            Ok(turn) => turn,
            Err(message) => ChatTurn::assistant(message, Vec::new()),
        }
    }

    async fn try_ask(&self, question: &str) -> Result<ChatTurn, String> {
        let request = ChatRequest {
            query: question.to_string(),
        };
        let response = self
            .http
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|err| self.describe_transport_error(&err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.describe_transport_error(&err))?;
        if !status.is_success() {
            return Err(format!(
                "An error occurred: {status}: {}",
                error_detail(&body)
            ));
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|err| format!("An error occurred: invalid response body: {err}"))?;
        let text = parsed
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or(NO_RESPONSE_TEXT)
            .to_string();
        let images = parsed
            .get("images")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChatTurn::assistant(text, images))
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_connect() {
            format!(
                "Failed to connect to backend API at {}. Is it running?",
                self.display_url
            )
        } else {
            format!("An error occurred: {err}")
        }
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

pub struct ChatSession {
    client: BackendClient,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            history: Vec::new(),
        }
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Records the question, asks the backend and records the reply.
    pub async fn send(&mut self, question: &str) -> &ChatTurn {
        self.history.push(ChatTurn::user(question));
        let reply = self.client.ask(question).await;
        self.history.push(reply);
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self, last: Option<usize>) -> &[ChatTurn] {
        let start = last.map_or(0, |n| self.history.len().saturating_sub(n));
        &self.history[start..]
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn label(&self, role: Role) -> String {
        let label = match role {
            Role::User => USER_PROMPT,
            Role::Assistant => ASSISTANT_LABEL,
        };
        if !self.enabled {
            return label.to_string();
        }
        match role {
            Role::User => label.cyan().bold().to_string(),
            Role::Assistant => label.red().bold().to_string(),
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.enabled {
            text.dark_grey().to_string()
        } else {
            text.to_string()
        }
    }
}

pub(crate) fn render_turn(turn: &ChatTurn, client: &BackendClient, palette: Palette) -> String {
    let mut out = format!("{}{}", palette.label(turn.role), turn.text);
    for image in &turn.images {
        out.push('\n');
        out.push_str(&palette.dim(&format!("  image: {}", client.image_url(image))));
    }
    out
}

/// Reads questions line by line until EOF or an exit word.
pub async fn run_chat<R, W>(
    session: &mut ChatSession,
    input: R,
    out: &mut W,
    palette: Palette,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{BANNER}")?;
    writeln!(out, "{}", palette.dim(EXAMPLE_HINT))?;

    let mut lines = input.lines();
    loop {
        write!(out, "{}", palette.label(Role::User))?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit_word(line) {
            break;
        }

        if is_command_line(line) {
            match parse_command(line) {
                Ok(Command::Quit) => break,
                Ok(command) => handle_command(session, command, out, palette)?,
                Err(err) => writeln!(out, "{}", err.message())?,
            }
            continue;
        }

        writeln!(out, "{}", palette.dim("Thinking..."))?;
        out.flush()?;
        let reply = session.send(line).await.clone();
        tracing::debug!(images = reply.images.len(), "received chat reply");
        writeln!(out, "{}", render_turn(&reply, session.client(), palette))?;
    }

    Ok(())
}

fn handle_command<W: Write>(
    session: &mut ChatSession,
    command: Command,
    out: &mut W,
    palette: Palette,
) -> Result<()> {
    match command {
        Command::Help => writeln!(out, "{HELP_TEXT}")?,
        Command::History(last) => {
            let turns = session.history(last);
            if turns.is_empty() {
                writeln!(out, "No messages yet.")?;
            }
            for turn in turns {
                writeln!(out, "{}", render_turn(turn, session.client(), palette))?;
            }
        }
        Command::Clear => {
            session.clear();
            if palette.enabled {
                queue!(
                    out,
                    terminal::Clear(terminal::ClearType::All),
                    cursor::MoveTo(0, 0)
                )?;
            }
            writeln!(out, "Conversation cleared.")?;
        }
        Command::Backend => writeln!(out, "Backend: {}", session.client().base_url())?,
        Command::Quit => {}
    }
    Ok(())
}
