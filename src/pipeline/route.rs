const GREETINGS: [&str; 18] = [
    "hi",
    "hello",
    "hey",
    "hiya",
    "howdy",
    "yo",
    "hi there",
    "hello there",
    "hey there",
    "good morning",
    "good afternoon",
    "good evening",
    "greetings",
    "thanks",
    "thank you",
    "how are you",
    "what's up",
    "sup",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Greeting,
    Conversational,
    Data,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Conversational => "conversational",
            Self::Data => "data",
        }
    }
}

pub fn is_greeting(question: &str) -> bool {
    let normalized = question
        .trim()
        .trim_end_matches(['!', '.', '?', ',', ' '])
        .to_lowercase();
    !normalized.is_empty() && GREETINGS.contains(&normalized.as_str())
}

/// Reads the classifier's yes/no verdict. Anything other than a clear "no"
/// routes to data analysis.
pub fn parse_classification(text: &str) -> Route {
    let first_word = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|ch: char| !ch.is_alphanumeric())
        .to_ascii_lowercase();

    match first_word.as_str() {
        "no" => Route::Conversational,
        _ => Route::Data,
    }
}

/// Strips markdown code fences the model sometimes wraps code in.
pub fn clean_code(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.trim().lines() {
        if line.trim_start().starts_with("```") {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}
