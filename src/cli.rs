use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::{ALLOWED_MODELS, DEFAULT_MODEL, is_allowed_model};

/// Simple OpenAI chat REPL with local tools.
#[derive(Parser, Debug, Clone)]
#[command(name = "hlpr", version)]
pub struct Cli {
    /// Model to use for chat
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// List available models and exit
    #[arg(short, long)]
    pub list_models: bool,

    /// Include file contents in the conversation (repeatable)
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Show token usage statistics after each answer
    #[arg(short, long)]
    pub stats: bool,

    /// Enable web search
    #[arg(short, long)]
    pub web: bool,

    /// Ask a single question and exit instead of starting the REPL
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}

impl Cli {
    pub fn one_shot_prompt(&self) -> Option<String> {
        let prompt = self.prompt.join(" ");
        let prompt = prompt.trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }
}

pub fn model_listing() -> String {
    let mut listing = String::from("Available models:");
    for model in ALLOWED_MODELS {
        listing.push_str("\n- ");
        listing.push_str(model);
    }
    listing
}

pub fn validate_model(model: &str) -> Result<()> {
    if !is_allowed_model(model) {
        bail!(
            "Model '{}' not in allowed list. Use --list-models to see available options.",
            model
        );
    }
    Ok(())
}

fn read_context_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read --file '{}'", path.display()))
}

/// Base prompt followed by the verbatim contents of every `--file`.
pub fn developer_message(system_prompt: &str, files: &[PathBuf]) -> Result<String> {
    let mut message = system_prompt.to_string();
    for path in files {
        let content = read_context_file(path)?;
        message.push_str(&format!(
            "\nThe user wants to discuss the contents of the file '{}'\n",
            path.display()
        ));
        message.push_str(&format!("Here is the file content:\n{content}\n"));
    }
    Ok(message)
}
