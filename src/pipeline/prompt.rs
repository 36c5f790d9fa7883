pub const GREETING_REPLY: &str = "Hello! I can answer questions about the dataset: counts, averages, survival rates, distributions, and charts. What would you like to know?";

pub const NO_OUTPUT_PLACEHOLDER: &str = "(no text output; likely a plot was generated)";

pub const IMAGE_NOTE: &str = "A plot image was saved and will be shown to the user.";

pub fn classification_prompt(columns: &str, question: &str) -> String {
    format!(
        r#"You route questions for a chatbot that answers questions about a tabular dataset.
The dataset is a pandas DataFrame with these columns:
{columns}

Question: {question}

Does answering this question require running Python code against the dataset (counting, filtering, aggregating, computing statistics, or drawing a chart)?
Reply with exactly one word: yes or no."#
    )
}

pub fn code_generation_prompt(columns: &str, question: &str) -> String {
    format!(
        r#"You are a Python data analyst. You have a pandas DataFrame called `df` with these columns:
{columns}

The names pd, np, plt and sns are already imported and available. Only these modules may be imported: pandas, numpy, matplotlib, seaborn, math, statistics, datetime, collections, itertools, re, json.

Write ONLY Python code (no explanation, no markdown fences) to answer this question:
{question}

Rules:
- If a plot is requested, draw it with plt or sns and then call save_plot() to store it
- Print the final result so it appears in output
- Do NOT use plt.show()
- Do NOT read or write files
- Keep code concise"#
    )
}

pub fn format_prompt(question: &str, result: &str, image_note: &str) -> String {
    format!(
        r#"You are a helpful data analyst. The user asked: "{question}"

The Python code produced this output:
{result}

{image_note}

Give a clear, concise answer based on this output. If there was an error, explain what went wrong simply."#
    )
}

pub fn conversational_system_prompt(dataset: &str, columns: &str) -> String {
    format!(
        r#"You are a friendly assistant in a chat app for exploring the {dataset} dataset.
The dataset has these columns:
{columns}

Reply briefly and conversationally. When the user asks what you can do, suggest example questions about the data. Do not invent numbers about the dataset."#
    )
}
