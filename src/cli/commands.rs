#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    Clear,
    History(Option<usize>),
    Backend,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

pub(crate) const HELP_TEXT: &str = "Available commands:\n  /help                Show this command list\n  /history [n]         Show the conversation so far (or the last n messages)\n  /clear               Forget the conversation and clear the screen\n  /backend             Show the backend URL questions are sent to\n  /quit                Leave the chat (exit and quit work too)";

pub(crate) fn parse_command(line: &str) -> Result<Command, ParseError> {
    if !line.starts_with('/') {
        return Err(ParseError::new("not a command"));
    }

    let trimmed = line.trim();
    if trimmed == "/" {
        return Err(ParseError::new("empty command. Try /help"));
    }

    let command_text = &trimmed[1..];
    let mut parts = command_text.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    if name.is_empty() {
        return Err(ParseError::new("empty command. Try /help"));
    }
    let rest = parts.next().map(str::trim).unwrap_or("");

    match name.as_str() {
        "help" => expect_no_args(rest, Command::Help, "usage: /help"),
        "clear" => expect_no_args(rest, Command::Clear, "usage: /clear"),
        "history" => parse_history(rest),
        "backend" => expect_no_args(rest, Command::Backend, "usage: /backend"),
        "quit" | "exit" => expect_no_args(rest, Command::Quit, "usage: /quit"),
        _ => Err(ParseError::new(format!(
            "unknown command '/{name}'. Try /help"
        ))),
    }
}

pub(crate) fn is_command_line(line: &str) -> bool {
    line.starts_with('/')
}

pub(crate) fn is_exit_word(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

fn expect_no_args(rest: &str, command: Command, usage: &str) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::new(usage))
    }
}

fn parse_history(rest: &str) -> Result<Command, ParseError> {
    if rest.is_empty() {
        return Ok(Command::History(None));
    }

    let value = rest
        .parse::<usize>()
        .map_err(|_| ParseError::new("usage: /history [n]"))?;
    if value == 0 {
        return Err(ParseError::new("usage: /history [n] (n must be >= 1)"));
    }

    Ok(Command::History(Some(value)))
}
