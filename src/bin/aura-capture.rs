//! Operator CLI for the capture pipeline.
//!
//! Observed calls are read as JSON lines, one `{url, method, body, timestamp?}`
//! object per line. State lives in a JSON file store shared by all
//! subcommands.
//!
//! Usage:
//!   aura-capture ingest calls.jsonl --page-url https://portal.example.com/s/
//!   aura-capture checklist
//!   aura-capture set-cookie 'sid=...; oid=...'
//!   aura-capture config --server-url http://localhost:8080 --auto-forward true
//!   aura-capture sync

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use aura_capture::status::{change_icon, change_notification, pending_changes, IconState};
use aura_capture::{
    capture, settings, Applied, CaptureSession, Category, Classification, Classifier,
    CurlSynthesizer, Forwarder, HistoryOwner, HttpCredentialService, JsonStore, ObservedCall,
    PageContext, Rules, Settings, Store, SyncStatus,
};

#[derive(Parser, Debug)]
#[command(name = "aura-capture")]
#[command(about = "Classify Aura traffic, keep the capture history and sync credentials")]
struct Cli {
    /// JSON file holding history, checklist and settings
    #[arg(long, global = true, default_value = "aura-capture.json")]
    store: PathBuf,

    /// YAML signature rules (built-in rules when omitted)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct PageArgs {
    /// URL of the page the calls were observed on
    #[arg(long)]
    page_url: Url,

    #[arg(long, default_value = "")]
    user_agent: String,

    #[arg(long, default_value = "")]
    accept_language: String,
}

impl PageArgs {
    fn context(&self) -> PageContext {
        PageContext::new(
            self.page_url.clone(),
            &self.user_agent,
            &self.accept_language,
        )
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify calls without touching the store
    Classify {
        file: PathBuf,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Capture calls into the stored history
    Ingest {
        file: PathBuf,
        #[command(flatten)]
        page: PageArgs,
    },
    /// List the stored history, most recent first
    List {
        /// Only entries of this category (`HEADER`, `Work Orders List`, ...)
        #[arg(long)]
        category: Option<Category>,
    },
    /// Print the cURL command for one history entry
    Curl { index: usize },
    /// Show the checklist and icon state
    Checklist,
    /// Empty the history
    Clear,
    /// Save the session cookie used for replay
    SetCookie { cookie: String },
    /// Show or change the credential service settings
    Config {
        #[arg(long)]
        server_url: Option<String>,
        #[arg(long)]
        auto_forward: Option<bool>,
    },
    /// Forward the latest record of each category to the credential service
    Sync,
    /// Print the credential viewer URL
    Viewer,
}

fn load_rules(path: Option<&Path>) -> anyhow::Result<Rules> {
    match path {
        Some(path) => Rules::from_file(path)
            .with_context(|| format!("failed to load rules from {}", path.display())),
        None => Ok(Rules::default()),
    }
}

fn read_calls(path: &Path) -> anyhow::Result<Vec<ObservedCall>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut calls = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let call: ObservedCall = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid call", path.display(), n + 1))?;
        calls.push(call);
    }
    Ok(calls)
}

fn describe(classification: &Classification) -> String {
    if let Some(category) = classification.category() {
        return format!("captured as {category}");
    }
    match classification {
        Classification::Ignored(reason) => format!("ignored ({reason:?})"),
        _ => "out of scope".to_string(),
    }
}

fn print_checklist(owner: &HistoryOwner<JsonStore>) -> anyhow::Result<()> {
    let state = owner.checklist()?;
    let mark = |done: bool| if done { "x" } else { " " };
    println!("[{}] HEADER", mark(state.has_header_view));
    println!("[{}] Work Orders List", mark(state.has_work_orders_list));
    println!("[{}] PII Details", mark(state.has_pii_details));
    println!("icon: {}", IconState::from_checklist(&state).as_str());
    Ok(())
}

async fn ingest(
    store: Arc<JsonStore>,
    classifier: Classifier,
    page: PageContext,
    calls: Vec<ObservedCall>,
) -> anyhow::Result<()> {
    let owner = HistoryOwner::new(store.clone());
    owner.initialize()?;

    let (tx, rx) = capture::channel();
    let mut session = CaptureSession::new(Arc::new(classifier), page, tx);
    let now = Utc::now();
    for call in &calls {
        session.observe_at(call, now)?;
    }
    let seen = session.requests().len();
    drop(session);

    // Notifications and the icon follow the store, not the owner's return
    // values; each apply writes history then checklist, drained right after.
    let mut changes = store.subscribe();
    let mut icon = None;
    let mut applied: Vec<Applied> = Vec::new();
    owner
        .run(rx, |a| {
            applied.push(a);
            for change in pending_changes(&mut changes) {
                if let Some(n) = change_notification(&change) {
                    println!("{}: {}", n.title, n.message);
                }
                icon = change_icon(&change).or(icon);
            }
        })
        .await;
    info!(calls = calls.len(), captured = seen, applied = applied.len(), "ingest finished");
    if let Some(icon) = icon {
        println!("icon: {}", icon.as_str());
    }

    let settings = Settings::load(store.as_ref())?;
    if !settings.auto_forward {
        return Ok(());
    }
    let Some(credential) = settings.credential.as_deref() else {
        warn!("auto-forward is enabled but no cookie is saved");
        return Ok(());
    };
    if settings.server_url.is_none() {
        warn!("auto-forward is enabled but no server URL is saved");
        return Ok(());
    }
    let forwarder = Forwarder::new(HttpCredentialService::from_settings(&settings)?)?;
    // Every applied record of a named category is forwarded, including a
    // HEADER that reset the history to a single entry. A trigger on history
    // growth would miss that reset.
    for a in applied.iter().filter(|a| !a.record.category.is_uncategorized()) {
        match forwarder.forward_status(&a.record, credential).await {
            SyncStatus::Synced => println!("{}: synced", a.record.category),
            SyncStatus::Failed(reason) => println!("{}: failed: {reason}", a.record.category),
            SyncStatus::Syncing => {}
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(
        JsonStore::open(&cli.store)
            .with_context(|| format!("failed to open store {}", cli.store.display()))?,
    );
    let owner = HistoryOwner::new(store.clone());

    match cli.command {
        Command::Classify { file, page } => {
            let classifier = Classifier::new(load_rules(cli.rules.as_deref())?)?;
            let calls = read_calls(&file)?;
            let results = classifier.classify_batch(&page.context(), &calls, Utc::now());
            for (call, result) in calls.iter().zip(&results) {
                let verdict = if call.is_capturable() {
                    describe(result)
                } else {
                    describe(&Classification::OutOfScope)
                };
                println!("{verdict}\t{}", call.url);
            }
        }
        Command::Ingest { file, page } => {
            let classifier = Classifier::new(load_rules(cli.rules.as_deref())?)?;
            let calls = read_calls(&file)?;
            ingest(store, classifier, page.context(), calls).await?;
        }
        Command::List { category } => {
            let history = owner.history()?;
            let entries = history
                .iter()
                .enumerate()
                .filter(|(_, r)| category.map_or(true, |c| r.is(c)));
            for (i, record) in entries {
                println!(
                    "{i}\t{}\t{}\t{}",
                    record.timestamp.to_rfc3339(),
                    record.category,
                    record.url
                );
            }
        }
        Command::Curl { index } => {
            let settings = Settings::load(store.as_ref())?;
            let history = owner.history()?;
            let Some(record) = history.get(index) else {
                bail!("no history entry at index {index} ({} stored)", history.len());
            };
            let synthesizer = CurlSynthesizer::new()?;
            println!("{}", synthesizer.synthesize(record, settings.credential()?));
        }
        Command::Checklist => print_checklist(&owner)?,
        Command::Clear => {
            owner.clear()?;
            println!("history cleared");
        }
        Command::SetCookie { cookie } => {
            settings::save_credential(store.as_ref(), &cookie)?;
            println!("cookie saved");
        }
        Command::Config {
            server_url,
            auto_forward,
        } => {
            let current = Settings::load(store.as_ref())?;
            match (server_url, auto_forward) {
                (Some(url), flag) => settings::save_server_config(
                    store.as_ref(),
                    &url,
                    flag.unwrap_or(current.auto_forward),
                )?,
                (None, Some(flag)) => settings::set_auto_forward(store.as_ref(), flag)?,
                (None, None) => {}
            }
            let settings = Settings::load(store.as_ref())?;
            println!("server: {}", settings.server_url.as_deref().unwrap_or("unset"));
            println!("auto-forward: {}", settings.auto_forward);
            println!("cookie: {}", if settings.credential.is_some() { "set" } else { "unset" });
        }
        Command::Sync => {
            let settings = Settings::load(store.as_ref())?;
            let credential = settings.credential()?;
            let forwarder = Forwarder::new(HttpCredentialService::from_settings(&settings)?)?;
            let report = forwarder
                .forward_all_with(&owner.history()?, credential, |category: Category, status| {
                    match status {
                        SyncStatus::Syncing => println!("{category}: syncing"),
                        SyncStatus::Synced => println!("{category}: synced"),
                        SyncStatus::Failed(reason) => println!("{category}: failed: {reason}"),
                    }
                })
                .await?;
            println!("{} synced, {} failed", report.succeeded(), report.failed());
            if report.failed() > 0 {
                std::process::exit(1);
            }
        }
        Command::Viewer => {
            println!("{}", Settings::load(store.as_ref())?.viewer_url());
        }
    }
    Ok(())
}
