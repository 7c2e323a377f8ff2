use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voiceforge_session::backend::memory::MemoryBackend;
use voiceforge_session::channel::memory::MemoryChannel;
use voiceforge_session::{
    mount, Language, ProjectContext, RunReport, SessionConfig, SessionTarget,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a scripted voice session against in-memory collaborators", long_about = None)]
struct Cli {
    /// Replay script (YAML).
    script: PathBuf,

    #[arg(long, value_name = "PATH", help = "Session config file (YAML)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 20,
        help = "Milliseconds to let the session settle after each step"
    )]
    step_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScriptTarget {
    Project(String),
    LearnBook(String),
}

impl From<ScriptTarget> for SessionTarget {
    fn from(target: ScriptTarget) -> Self {
        match target {
            ScriptTarget::Project(id) => SessionTarget::Project(id),
            ScriptTarget::LearnBook(id) => SessionTarget::LearnBook(id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    name: String,
    #[serde(default)]
    language: Language,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    local: bool,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Local(String),
    Remote(String),
    Payload {
        topic: String,
        body: serde_json::Value,
    },
    Edit(String),
    Language(Language),
    Run,
    WaitMs(u64),
}

#[derive(Debug, Deserialize)]
struct Script {
    target: ScriptTarget,
    record: Option<Record>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    steps: Vec<Step>,
}

fn report_json(report: &RunReport) -> serde_json::Value {
    match report {
        RunReport::Completed(r) => json!({ "outcome": "completed", "result": r }),
        RunReport::ExitedNonZero(r) => json!({ "outcome": "exited_non_zero", "result": r }),
        RunReport::TimedOut(r) => json!({ "outcome": "timed_out", "result": r }),
        RunReport::TransportFailed(e) => json!({ "outcome": "transport_failed", "error": e }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    let raw = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading script {}", cli.script.display()))?;
    let script: Script = serde_yaml::from_str(&raw).context("parsing script")?;

    let target = SessionTarget::from(script.target);
    let channel = Arc::new(MemoryChannel::new());
    let backend = Arc::new(MemoryBackend::new());
    if let Some(record) = script.record {
        backend.insert(
            &target,
            ProjectContext {
                id: target.id().to_string(),
                name: record.name,
                language: record.language,
                code: record.code,
            },
        );
    }
    for entry in &script.history {
        channel.push_message(&uuid::Uuid::new_v4().to_string(), entry.local, &entry.text);
    }

    let handle = mount(&config, target.clone(), channel.clone(), backend.clone());
    let step_pause = Duration::from_millis(cli.step_ms);
    tokio::time::sleep(step_pause).await;

    let mut runs = Vec::new();
    for (i, step) in script.steps.into_iter().enumerate() {
        info!(step = i, ?step, "replaying");
        match step {
            Step::Local(text) => {
                channel.push_local(&text);
            }
            Step::Remote(text) => {
                channel.push_remote(&text);
            }
            Step::Payload { topic, body } => {
                channel.deliver(&topic, serde_json::to_vec(&body)?);
            }
            Step::Edit(code) => handle.set_code(code)?,
            Step::Language(language) => handle.set_language(language)?,
            Step::Run => match handle.run().await {
                Ok(report) => runs.push(report_json(&report)),
                Err(rejected) => runs.push(json!({ "rejected": rejected.to_string() })),
            },
            Step::WaitMs(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        tokio::time::sleep(step_pause).await;
    }

    // Let pending debounces fire before reading results.
    let quiet = config.timing.sync_quiet().max(config.timing.persist_quiet());
    tokio::time::sleep(quiet + step_pause).await;

    let snapshot = handle.snapshot().await?;
    handle.unmount().await?;

    let publishes: Vec<_> = channel
        .published()
        .iter()
        .map(|p| json!({ "topic": p.topic, "payload": p.json() }))
        .collect();
    let saves: Vec<_> = backend
        .saves()
        .into_iter()
        .map(|(_, state)| state)
        .collect();

    let out = json!({
        "target": target.to_string(),
        "snapshot": snapshot,
        "publishes": publishes,
        "saves": saves,
        "runs": runs,
        "backend_runs": backend.runs(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
