mod flow;
mod prompt;
mod route;
#[cfg(test)]
pub(crate) mod testing;

pub use flow::{ChatAnswer, ChatPipeline, TableContext};
pub use prompt::{GREETING_REPLY, IMAGE_NOTE, NO_OUTPUT_PLACEHOLDER};
pub use route::{Route, clean_code, is_greeting, parse_classification};
