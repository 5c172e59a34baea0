use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use undo_ring_history::config::resolve_config_path;
use undo_ring_history::{ExhaustionPolicy, HistoryConfig, LocalHistory};

/// A line-oriented text console with a bounded undo/redo history.
#[derive(Parser, Debug)]
#[command(name = "undo-ring", version, about)]
struct Cli {
    /// History config file (defaults to `UNDO_RING_CONFIG` or `undo-ring.json`
    /// next to the executable).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of changes kept in history.
    #[arg(long)]
    capacity: Option<usize>,

    /// Fail instead of ignoring undo/redo when history is exhausted.
    #[arg(long)]
    strict: bool,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    show_config: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Type(String),
    Erase(usize),
    Undo,
    Redo,
    Show,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  type <text>   append text to the document
  erase <n>     remove the last n characters
  undo          reverse the last edit
  redo          reapply the last undone edit
  show          print the document
  status        print history counters
  help          print this message
  quit          exit";

fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (word, rest) = match line.trim_start().split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (line.trim(), ""),
    };

    let command = match word {
        "type" => {
            if rest.is_empty() {
                bail!("type needs some text");
            }
            Command::Type(rest.to_string())
        }
        "erase" => {
            let count: usize = rest
                .trim()
                .parse()
                .with_context(|| format!("invalid character count '{}'", rest.trim()))?;
            Command::Erase(count)
        }
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "show" => Command::Show,
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}' (try 'help')"),
    };
    Ok(command)
}

fn effective_config(cli: &Cli) -> HistoryConfig {
    let path = cli.config.clone().unwrap_or_else(resolve_config_path);
    let mut config = HistoryConfig::load_or_default(&path);
    if let Some(capacity) = cli.capacity {
        config.capacity = capacity;
    }
    if cli.strict {
        config.undo_policy = ExhaustionPolicy::Fail;
        config.redo_policy = ExhaustionPolicy::Fail;
    }
    config.sanitize();
    config
}

/// Text document plus the history recording its edits.
struct Session {
    doc: Rc<RefCell<String>>,
    history: LocalHistory<String>,
}

impl Session {
    fn new(config: &HistoryConfig) -> Result<Self> {
        let doc = Rc::new(RefCell::new(String::new()));
        let history = LocalHistory::attach(&doc, config).context("Failed to create history")?;
        Ok(Self { doc, history })
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.doc.borrow_mut().push_str(text);
        let len = text.len();
        let redo_text = text.to_string();
        self.history.push_fn(
            move |doc: &mut String| doc.truncate(doc.len().saturating_sub(len)),
            move |doc: &mut String| doc.push_str(&redo_text),
        )?;
        Ok(())
    }

    fn erase(&self, count: usize) -> Result<()> {
        let removed = {
            let mut doc = self.doc.borrow_mut();
            let keep = match count {
                0 => doc.len(),
                n => doc.char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i),
            };
            doc.split_off(keep)
        };
        if removed.is_empty() {
            return Ok(());
        }

        let len = removed.len();
        self.history.push_fn(
            move |doc: &mut String| doc.push_str(&removed),
            move |doc: &mut String| doc.truncate(doc.len().saturating_sub(len)),
        )?;
        Ok(())
    }

    /// Runs one command. Returns `false` when the session should end.
    fn execute(&self, command: Command, out: &mut impl Write) -> Result<bool> {
        match command {
            Command::Type(text) => self.type_text(&text)?,
            Command::Erase(count) => self.erase(count)?,
            Command::Undo => self.history.undo()?,
            Command::Redo => self.history.redo()?,
            Command::Show => writeln!(out, "{}", self.doc.borrow())?,
            Command::Status => writeln!(
                out,
                "undo: {}  redo: {}  capacity: {}",
                self.history.undo_count()?,
                self.history.redo_count()?,
                self.history.capacity()?
            )?,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

fn run(session: &Session, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = parse_command(&line).and_then(|command| session.execute(command, out));
        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => writeln!(out, "error: {e:#}")?,
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = effective_config(&cli);
    if cli.show_config {
        let json = serde_json::to_string_pretty(&config).context("Failed to render config")?;
        println!("{json}");
        return Ok(());
    }

    tracing::info!(
        capacity = config.capacity,
        undo_policy = ?config.undo_policy,
        redo_policy = ?config.redo_policy,
        "Starting undo-ring"
    );

    let session = Session::new(&config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    run(&session, stdin.lock(), &mut stdout)
}
