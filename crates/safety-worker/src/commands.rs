//! Subcommand implementations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use safety_core::state::schema::COLLECTION_RECORDS;
use safety_core::{
    load_conditions_file, ChatTurn, ClassificationOutcome, ConditionSet, ConversationMessage,
    EventFilter, SafetyEvent,
};

use crate::runtime::WorkerRuntime;

pub struct ClassifyArgs {
    pub user: String,
    pub conversation: String,
    pub message: String,
    pub message_id: Option<String>,
    pub history: Option<PathBuf>,
}

pub async fn classify(runtime: &WorkerRuntime, args: ClassifyArgs) -> Result<()> {
    let recent = match &args.history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };
    let message_id = args
        .message_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let turn = ChatTurn::new(args.user, args.conversation, message_id, args.message)
        .with_recent_messages(recent);

    let outcome = runtime.orchestrator().run(&turn).await;
    println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    Ok(())
}

pub async fn replay(
    runtime: &WorkerRuntime,
    file: &Path,
    print_events: bool,
    conversation: Option<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading turns from {}", file.display()))?;
    let turns = parse_turns(&text)?;
    let records_before = runtime.store().count(COLLECTION_RECORDS).await;

    let printer = print_events.then(|| {
        let filter = match conversation {
            Some(id) => EventFilter::new().conversation(&id),
            None => EventFilter::new(),
        };
        spawn_event_printer(runtime.events().subscribe(), filter)
    });

    let queue = runtime.start_queue();
    let handle = queue.handle();
    let total = turns.len();
    for turn in turns {
        handle
            .submit_wait(turn)
            .await
            .context("escalation queue closed during replay")?;
    }
    drop(handle);
    let summary = queue.shutdown().await.context("draining escalation queue")?;

    if let Some((stop, task)) = printer {
        let _ = stop.send(());
        task.await.context("event printer task failed")?;
    }

    let records_created = runtime.store().count(COLLECTION_RECORDS).await - records_before;
    info!(turns = total, records_created, "Replay finished");
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "turns": total,
            "summary": summary,
            "recordsCreated": records_created,
        }))?
    );
    Ok(())
}

pub fn conditions(file: &Path) -> Result<()> {
    let loaded = load_conditions_file(file)
        .with_context(|| format!("reading conditions from {}", file.display()))?;
    let total = loaded.len();
    let set = ConditionSet::from_conditions(loaded);

    for (tier, group) in set.groups() {
        println!("{} ({})", tier.heading(), group.len());
        for condition in group {
            println!(
                "  [{}] {} {} ({})",
                condition.priority, condition.id, condition.title, condition.category
            );
        }
    }
    let skipped = total - set.len();
    if skipped > 0 {
        println!("{skipped} inactive or tier-0 condition(s) skipped");
    }
    Ok(())
}

/// Parse JSON Lines of chat turns. Blank lines are ignored.
pub fn parse_turns(text: &str) -> Result<Vec<ChatTurn>> {
    let mut turns = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let turn: ChatTurn = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid chat turn", index + 1))?;
        turns.push(turn);
    }
    if turns.is_empty() {
        bail!("no chat turns found");
    }
    Ok(turns)
}

fn read_history(path: &Path) -> Result<Vec<ConversationMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading history from {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing history in {}", path.display()))
}

fn outcome_json(outcome: &ClassificationOutcome) -> serde_json::Value {
    match outcome {
        ClassificationOutcome::NoAction { result } => json!({
            "outcome": "no_action",
            "result": result,
        }),
        ClassificationOutcome::Unavailable { stage, reason } => json!({
            "outcome": "unavailable",
            "stage": stage,
            "reason": reason,
        }),
        ClassificationOutcome::IncidentRecorded { result, record_id } => json!({
            "outcome": "incident_recorded",
            "result": result,
            "recordId": record_id,
        }),
        ClassificationOutcome::RecordingFailed {
            result,
            record_id,
            error,
        } => json!({
            "outcome": "recording_failed",
            "result": result,
            "recordId": record_id,
            "error": error,
        }),
    }
}

fn spawn_event_printer(
    mut rx: broadcast::Receiver<SafetyEvent>,
    filter: EventFilter,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(event) => print_event(&event, &filter),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event printer lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = &mut stop_rx => break,
            }
        }
        while let Ok(event) = rx.try_recv() {
            print_event(&event, &filter);
        }
    });
    (stop_tx, task)
}

fn print_event(event: &SafetyEvent, filter: &EventFilter) {
    if !filter.matches(event) {
        return;
    }
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize safety event"),
    }
}
