use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::agent::{Agent, TurnOutput, is_protocol_violation};
use crate::model_gateway::ModelGateway;
use crate::render::{SEPARATOR, format_stats, terminal_width, wrap_text};
use crate::session::SessionSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplInput<'a> {
    Empty,
    Exit,
    Edit,
    Show(&'a str),
    Set { key: &'a str, value: &'a str },
    Usage(&'static str),
    Prompt(&'a str),
}

fn parse_input(line: &str) -> ReplInput<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return ReplInput::Exit;
    }
    if line == ":edit" {
        return ReplInput::Edit;
    }
    if let Some(rest) = meta_argument(line, ":show") {
        return match rest {
            "" => ReplInput::Usage("usage: :show <model|web|stats>"),
            key => ReplInput::Show(key),
        };
    }
    if let Some(rest) = meta_argument(line, ":set") {
        return match rest.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => ReplInput::Set {
                key: key.trim(),
                value: value.trim(),
            },
            _ => ReplInput::Usage("usage: :set <key>=<value>"),
        };
    }
    ReplInput::Prompt(line)
}

/// `":set foo=1"` with command `":set"` yields `Some("foo=1")`.
fn meta_argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Repl<'a, G, W> {
    agent: Agent<'a, G>,
    settings: SessionSettings,
    editor: String,
    wrap_width: usize,
    out: W,
}

impl<'a, G: ModelGateway, W: Write> Repl<'a, G, W> {
    pub fn new(agent: Agent<'a, G>, settings: SessionSettings, editor: &str, out: W) -> Self {
        Self {
            agent,
            settings,
            editor: editor.to_string(),
            wrap_width: terminal_width(),
            out,
        }
    }

    pub fn with_wrap_width(mut self, wrap_width: usize) -> Self {
        self.wrap_width = wrap_width;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn agent(&self) -> &Agent<'a, G> {
        &self.agent
    }

    /// Reads lines until `exit`, end of input, or a fatal protocol error.
    pub async fn run<R: BufRead>(&mut self, mut input: R) -> Result<()> {
        loop {
            write!(self.out, "> ").context("Failed to write prompt")?;
            self.out.flush().context("Failed to flush stdout")?;

            let mut line = String::new();
            let read = input.read_line(&mut line).context("Failed to read stdin")?;
            if read == 0 {
                writeln!(self.out, "\nExiting.").context("Failed to write output")?;
                return Ok(());
            }

            if self.handle_line(&line).await? == Flow::Exit {
                return Ok(());
            }
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        match parse_input(line) {
            ReplInput::Empty => {}
            ReplInput::Exit => return Ok(Flow::Exit),
            ReplInput::Usage(usage) => self.say(usage)?,
            ReplInput::Show(key) => match self.settings.show(key) {
                Ok(value) => self.say(&format!("{} = {value}", key.to_ascii_lowercase()))?,
                Err(err) => self.say(&format!("Error: {err}"))?,
            },
            ReplInput::Set { key, value } => match self.settings.set(key, value) {
                Ok(()) => {
                    debug!(key = %key, value = %value, "session setting changed");
                    let current = self.settings.show(key)?;
                    self.say(&format!("{} = {current}", key.to_ascii_lowercase()))?;
                }
                Err(err) => self.say(&format!("Error: {err}"))?,
            },
            ReplInput::Edit => match edit_in_editor(&self.editor) {
                Ok(Some(text)) => self.ask(&text).await?,
                Ok(None) => self.say("(empty input, nothing sent)")?,
                Err(err) => {
                    warn!(editor = %self.editor, error = %err, "editor failed");
                    self.say(&format!("Error: {err:#}"))?;
                }
            },
            ReplInput::Prompt(prompt) => self.ask(prompt).await?,
        }
        Ok(Flow::Continue)
    }

    async fn ask(&mut self, prompt: &str) -> Result<()> {
        match self.agent.run_turn(&self.settings, prompt).await {
            Ok(turn) => self.render_turn(&turn),
            Err(err) if is_protocol_violation(&err) => Err(err),
            Err(err) => {
                warn!(error = %err, "turn failed");
                self.say(&format!("Error: {err:#}"))
            }
        }
    }

    fn render_turn(&mut self, turn: &TurnOutput) -> Result<()> {
        writeln!(self.out, "{SEPARATOR}").context("Failed to write output")?;
        writeln!(self.out, "{}", wrap_text(turn.text.trim(), self.wrap_width))
            .context("Failed to write output")?;
        if self.settings.stats() {
            writeln!(self.out, "{}", format_stats(&turn.usage)).context("Failed to write output")?;
        }
        Ok(())
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}").context("Failed to write output")
    }
}

/// Opens `editor` on an empty scratch file and returns its trimmed content,
/// or `None` when the user saved nothing.
fn edit_in_editor(editor: &str) -> Result<Option<String>> {
    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("No editor configured. Set EDITOR."))?;
    let scratch = tempfile::Builder::new()
        .prefix("hlpr-edit-")
        .suffix(".md")
        .tempfile()
        .context("Failed to create scratch file")?;

    run_editor(program, parts, scratch.path())
}

fn run_editor<'a>(
    program: &str,
    args: impl Iterator<Item = &'a str>,
    path: &Path,
) -> Result<Option<String>> {
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .status()
        .with_context(|| format!("Failed to launch editor '{program}'"))?;
    if !status.success() {
        bail!("Editor '{}' exited with {}", program, status);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scratch file '{}'", path.display()))?;
    let content = content.trim();
    Ok((!content.is_empty()).then(|| content.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{Flow, Repl, ReplInput, parse_input};
    use crate::agent::Agent;
    use crate::agent::tools::ToolRegistry;
    use crate::model::{ConversationItem, Message, OutputEvent};
    use crate::model_gateway::testing::{ScriptedGateway, event_response, text_response};
    use crate::session::SessionSettings;

    fn settings() -> SessionSettings {
        SessionSettings::new("gpt-4o-mini", false, false).expect("default model is allowed")
    }

    fn repl<'a>(
        gateway: &'a ScriptedGateway,
        registry: &'a ToolRegistry,
        editor: &str,
    ) -> Repl<'a, ScriptedGateway, Vec<u8>> {
        Repl::new(Agent::new(gateway, registry, "sys"), settings(), editor, Vec::new())
            .with_wrap_width(80)
    }

    fn output(repl: &Repl<'_, ScriptedGateway, Vec<u8>>) -> String {
        String::from_utf8_lossy(&repl.out).into_owned()
    }

    #[test]
    fn parse_recognises_meta_commands() {
        assert_eq!(parse_input("   "), ReplInput::Empty);
        assert_eq!(parse_input("EXIT"), ReplInput::Exit);
        assert_eq!(parse_input(" Quit \n"), ReplInput::Exit);
        assert_eq!(parse_input(":edit"), ReplInput::Edit);
        assert_eq!(parse_input(":show model"), ReplInput::Show("model"));
        assert_eq!(
            parse_input(":set web = on"),
            ReplInput::Set {
                key: "web",
                value: "on"
            }
        );
        assert!(matches!(parse_input(":set web"), ReplInput::Usage(_)));
        assert!(matches!(parse_input(":set =on"), ReplInput::Usage(_)));
        assert!(matches!(parse_input(":show"), ReplInput::Usage(_)));
        assert_eq!(parse_input(":settings"), ReplInput::Prompt(":settings"));
        assert_eq!(parse_input("hello there"), ReplInput::Prompt("hello there"));
    }

    #[tokio::test]
    async fn prompt_round_trip_records_model_and_conversation() {
        let gateway = ScriptedGateway::new().then(text_response("hi"));
        let registry = ToolRegistry::with_builtins().expect("builtins should register");
        let mut repl = repl(&gateway, &registry, "true");

        let flow = repl.handle_line("hello\n").await.expect("line should work");

        assert_eq!(flow, Flow::Continue);
        assert_eq!(gateway.request(0).model, "gpt-4o-mini");
        assert_eq!(
            &repl.agent().conversation()[1..],
            &[
                ConversationItem::Message(Message::user("hello")),
                ConversationItem::Message(Message::assistant("hi")),
            ]
        );
        let out = output(&repl);
        assert!(out.contains("----\nhi\n"), "unexpected output: {out}");
        assert!(!out.contains("stats:"));
    }

    #[tokio::test]
    async fn empty_lines_never_reach_the_model() {
        let gateway = ScriptedGateway::new();
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line("").await.expect("empty line");
        repl.handle_line("   \t ").await.expect("blank line");

        assert_eq!(gateway.request_count(), 0);
        assert_eq!(repl.agent().conversation().len(), 1);
    }

    #[tokio::test]
    async fn invalid_model_is_rejected_and_old_model_stays_in_use() {
        let gateway = ScriptedGateway::new()
            .then(text_response("a"))
            .then(text_response("b"));
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line(":set model=gpt-9").await.expect("set");
        assert!(output(&repl).contains("Error: model 'gpt-9' not in allowed list"));
        repl.handle_line("one").await.expect("turn");
        assert_eq!(gateway.request(0).model, "gpt-4o-mini");

        repl.handle_line(":set model=gpt-4.1-nano").await.expect("set");
        repl.handle_line("two").await.expect("turn");
        assert_eq!(gateway.request(1).model, "gpt-4.1-nano");
        assert_eq!(repl.settings().model(), "gpt-4.1-nano");
    }

    #[tokio::test]
    async fn web_toggle_changes_tool_list_without_duplicates() {
        let gateway = ScriptedGateway::new()
            .then(text_response("a"))
            .then(text_response("b"))
            .then(text_response("c"));
        let registry = ToolRegistry::with_builtins().expect("builtins should register");
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line(":set web=on").await.expect("set");
        repl.handle_line(":set web=TRUE").await.expect("set");
        repl.handle_line("one").await.expect("turn");
        repl.handle_line(":set web=off").await.expect("set");
        repl.handle_line("two").await.expect("turn");
        repl.handle_line(":set web=yes").await.expect("set");
        repl.handle_line("three").await.expect("turn");

        let web_counts: Vec<usize> = (0..3)
            .map(|index| {
                gateway
                    .request(index)
                    .tools
                    .iter()
                    .filter(|tool| tool.is_web_search())
                    .count()
            })
            .collect();
        assert_eq!(web_counts, vec![1, 0, 1]);
    }

    #[tokio::test]
    async fn show_and_unknown_keys() {
        let gateway = ScriptedGateway::new();
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line(":show model").await.expect("show");
        repl.handle_line(":show colour").await.expect("show");
        repl.handle_line(":set colour=blue").await.expect("set");

        let out = output(&repl);
        assert!(out.contains("model = gpt-4o-mini"), "unexpected output: {out}");
        assert_eq!(out.matches("Error: unknown setting 'colour'").count(), 2);
        assert_eq!(gateway.request_count(), 0);
    }

    #[tokio::test]
    async fn stats_are_printed_when_enabled() {
        let gateway = ScriptedGateway::new().then(text_response("hi"));
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line(":set stats=1").await.expect("set");
        repl.handle_line("hello").await.expect("turn");

        assert!(output(&repl).contains(
            "stats: input_tokens=1 output_tokens=2 cached_tokens=0 total_tokens=3"
        ));
    }

    #[tokio::test]
    async fn ordinary_turn_errors_keep_the_session_alive() {
        let gateway = ScriptedGateway::new().then_fail("service unavailable");
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        let flow = repl.handle_line("hello").await.expect("error is reported");

        assert_eq!(flow, Flow::Continue);
        assert!(output(&repl).contains("Error: service unavailable"));
    }

    #[tokio::test]
    async fn protocol_violations_end_the_session() {
        let gateway = ScriptedGateway::new().then(event_response(OutputEvent::Unknown {
            kind: "mystery".to_string(),
        }));
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        let err = repl
            .handle_line("hello")
            .await
            .expect_err("violation is fatal");
        assert!(err.to_string().contains("mystery"));
    }

    #[tokio::test]
    async fn run_stops_on_exit_and_on_end_of_input() {
        let gateway = ScriptedGateway::new().then(text_response("hi"));
        let registry = ToolRegistry::new();

        let mut first = repl(&gateway, &registry, "true");
        first
            .run(Cursor::new("hello\nexit\nnever sent\n"))
            .await
            .expect("run should finish");
        assert_eq!(gateway.request_count(), 1);

        let mut second = repl(&gateway, &registry, "true");
        second
            .run(Cursor::new(""))
            .await
            .expect("end of input is not an error");
        assert!(output(&second).contains("Exiting."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn edit_with_untouched_file_sends_nothing() {
        let gateway = ScriptedGateway::new();
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "true");

        repl.handle_line(":edit").await.expect("edit");

        assert_eq!(gateway.request_count(), 0);
        assert_eq!(repl.agent().conversation().len(), 1);
        assert!(output(&repl).contains("nothing sent"));
    }

    /// Writes a shell script that overwrites the scratch file with `printf`
    /// output, for use as `sh <script>`.
    #[cfg(unix)]
    fn fake_editor(dir: &tempfile::TempDir, printf_format: &str) -> String {
        let script = dir.path().join("fake-editor.sh");
        std::fs::write(&script, format!("printf '{printf_format}' > \"$1\"\n"))
            .expect("script written");
        format!("sh {}", script.display())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn edit_sends_trimmed_file_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let editor = fake_editor(&dir, "\\n  from the editor  \\n");

        let gateway = ScriptedGateway::new().then(text_response("got it"));
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, &editor);

        repl.handle_line(":edit").await.expect("edit");

        assert_eq!(
            gateway.request(0).input.last(),
            Some(&ConversationItem::Message(Message::user("from the editor")))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn edit_with_only_whitespace_sends_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let editor = fake_editor(&dir, "  \\n\\t \\n");

        let gateway = ScriptedGateway::new();
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, &editor);

        let flow = repl.handle_line(":edit").await.expect("edit");

        assert_eq!(flow, Flow::Continue);
        assert_eq!(gateway.request_count(), 0);
        assert_eq!(repl.agent().conversation().len(), 1);
        assert!(output(&repl).contains("nothing sent"));
    }

    #[tokio::test]
    async fn missing_editor_is_reported() {
        let gateway = ScriptedGateway::new();
        let registry = ToolRegistry::new();
        let mut repl = repl(&gateway, &registry, "hlpr-no-such-editor");

        let flow = repl.handle_line(":edit").await.expect("error is reported");

        assert_eq!(flow, Flow::Continue);
        assert!(output(&repl).contains("Failed to launch editor"));
        assert_eq!(gateway.request_count(), 0);
    }
}
