use std::env;

use crate::model::Usage;

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const MIN_TERMINAL_WIDTH: usize = 20;
pub const SEPARATOR: &str = "------------------------------------------------";

/// Width from `COLUMNS` when the shell exports it, otherwise 80.
pub fn terminal_width() -> usize {
    parse_width(env::var("COLUMNS").ok().as_deref())
}

fn parse_width(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|width| *width >= MIN_TERMINAL_WIDTH)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
}

/// Greedy word wrap. Existing line breaks are kept, and indentation of each
/// source line is preserved so lists and code blocks stay readable. Words
/// longer than the width are left on a line of their own.
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut wrapped = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            wrapped.push(String::new());
            continue;
        }
        let indent = &line[..line.len() - trimmed.len()];
        let mut current = indent.to_string();
        let mut has_word = false;
        for word in trimmed.split_whitespace() {
            let needed = if has_word { word.chars().count() + 1 } else { word.chars().count() };
            if has_word && current.chars().count() + needed > width {
                wrapped.push(std::mem::replace(&mut current, indent.to_string()));
                has_word = false;
            }
            if has_word {
                current.push(' ');
            }
            current.push_str(word);
            has_word = true;
        }
        wrapped.push(current);
    }
    wrapped.join("\n")
}

pub fn format_stats(usage: &Usage) -> String {
    format!(
        "stats: input_tokens={} output_tokens={} cached_tokens={} total_tokens={}",
        usage.input_tokens, usage.output_tokens, usage.cached_tokens, usage.total_tokens
    )
}
