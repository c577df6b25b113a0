use std::env;

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You're a helpful and friendly assistant.";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;
const DEFAULT_EDITOR: &str = "vi";

/// Process-wide settings read from the environment at start-up.
///
/// Runtime-mutable choices (model, web search, stats) live in
/// [`crate::session::SessionSettings`] instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub max_tool_rounds: usize,
    pub editor: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let api_key = get_var("OPENAI_API_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let api_base_url = non_empty_or(get_var("OPENAI_BASE_URL"), DEFAULT_API_BASE_URL);
        let model_timeout_secs = parse_positive_u64(
            get_var("MODEL_TIMEOUT_SECS").as_deref(),
            DEFAULT_MODEL_TIMEOUT_SECS,
        );
        let max_tool_rounds = parse_max_tool_rounds(get_var("MAX_TOOL_ROUNDS").as_deref());

        Self {
            api_key,
            api_base_url,
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_timeout_secs,
            max_tool_rounds,
            editor: non_empty_or(get_var("EDITOR"), DEFAULT_EDITOR),
        }
    }
}

fn non_empty_or(raw: Option<String>, default: &str) -> String {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_max_tool_rounds(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_env_with(|_| None)
}
