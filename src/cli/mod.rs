mod args;
mod chat;
mod commands;

pub use args::{CliArgs, CliCommand};
pub use chat::{BackendClient, ChatSession, ChatTurn, Palette, Role, run_chat};
