//! `irefined-cli run`: the engine behind a JSON-lines pipe.
//!
//! Each stdin line is one input tagged by `type`:
//!
//! ```text
//! {"type":"feed","message":{...push message...}}
//! {"type":"live","observation":{"observation":"join_control","registration":{...}}}
//! {"type":"enqueue","request":{"season_id":42,"start_time":"...","car_id":1,"car_class_id":2}}
//! {"type":"remove","key":"42-2024-05-01T18:00:00Z"}
//! {"type":"activate","key":"42-2024-05-01T18:00:00Z"}
//! {"type":"unload","feature":"auto-forfeit"}
//! {"type":"list"}
//! ```
//!
//! Stdout carries framed outbound requests, join requests and replies, also
//! one JSON object per line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use irefined_core::logging::{self, DEFAULT_LEVEL};
use irefined_core::transport::OutboundCommand;
use irefined_core::{
    ChannelJoinControl, ChannelTransport, Config, CoreError, DataServicesRequest, Database, Engine,
    EngineHandle, FeatureId, IntentKey, IntentView, LiveObservation, QueueRequest, Transport,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// JSON array of queue requests to load before starting
    #[arg(long)]
    queue: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LEVEL)]
    log_level: String,
    /// Keep guard state in memory instead of the data directory
    #[arg(long)]
    ephemeral: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Input {
    Feed { message: serde_json::Value },
    Live { observation: LiveObservation },
    Enqueue { request: QueueRequest },
    Remove { key: String },
    Activate { key: String },
    Unload { feature: FeatureId },
    List,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Output {
    Request(DataServicesRequest),
    Join { subsession_id: i64 },
    Queued { key: IntentKey },
    Removed { key: IntentKey, removed: bool },
    Activated { key: IntentKey, activated: bool },
    Unloaded { feature: FeatureId, unloaded: bool },
    Queue { intents: Vec<IntentView> },
    Error { message: String },
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_subscriber(&args.log_level);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(args))
}

async fn serve(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = if args.ephemeral {
        Database::open_memory()?
    } else {
        Database::open()?
    };

    let (transport, mut requests) = ChannelTransport::channel();
    let (join_control, mut joins) = ChannelJoinControl::channel();
    let mut engine = Engine::new(
        &config,
        Arc::new(transport.clone()),
        Arc::new(join_control),
        db,
    );

    if let Some(path) = &args.queue {
        let raw = std::fs::read_to_string(path)?;
        let seeded: Vec<QueueRequest> = serde_json::from_str(&raw)?;
        for request in seeded {
            let key = engine.enqueue(request)?;
            info!(%key, "loaded from queue file");
        }
    }

    let lifetime = CancellationToken::new();
    let (handle, task) = engine.spawn(lifetime.clone());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Output>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let output = tokio::select! {
                biased;
                Some(request) = requests.recv() => Output::Request(request),
                Some(subsession_id) = joins.recv() => Output::Join { subsession_id },
                Some(output) = out_rx.recv() => output,
                else => break,
            };
            let mut line = match serde_json::to_string(&output) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "could not encode output");
                    continue;
                }
            };
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    // The connection owner starts the push feed.
    if let Err(e) = transport.send(OutboundCommand::SubscribePopularSessions) {
        warn!(error = %e, "subscribe request was not handed off");
    }
    drop(transport);

    read_inputs(&handle, &out_tx).await;

    lifetime.cancel();
    task.await?;
    drop(handle);
    drop(out_tx);
    writer.await?;
    Ok(())
}

/// Feed stdin to the engine until EOF, Ctrl-C or a read error.
///
/// Lines are raw bytes so one line that is not UTF-8 only costs that line.
async fn read_inputs(handle: &EngineHandle, out_tx: &mpsc::UnboundedSender<Output>) {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = Vec::new();
    loop {
        line.clear();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return;
            }
            read = stdin.read_until(b'\n', &mut line) => match read {
                Ok(0) => return,
                Ok(_) => {
                    if let Some(output) = handle_line(handle, &line).await {
                        let _ = out_tx.send(output);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    return;
                }
            },
        }
    }
}

async fn handle_line(handle: &EngineHandle, line: &[u8]) -> Option<Output> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    let input = match serde_json::from_slice::<Input>(line) {
        Ok(input) => input,
        Err(e) => {
            warn!(error = %e, "unreadable input line");
            return Some(Output::Error {
                message: e.to_string(),
            });
        }
    };
    match apply(handle, input).await {
        Ok(output) => output,
        Err(e) => Some(Output::Error {
            message: e.to_string(),
        }),
    }
}

async fn apply(handle: &EngineHandle, input: Input) -> Result<Option<Output>, CoreError> {
    let output = match input {
        Input::Feed { message } => {
            let events = handle.publish(&message)?;
            debug!(events, "push message published");
            None
        }
        Input::Live { observation } => {
            handle.observe(observation)?;
            None
        }
        Input::Enqueue { request } => Some(Output::Queued {
            key: handle.enqueue(request).await?,
        }),
        Input::Remove { key } => {
            let key: IntentKey = key.parse()?;
            let removed = handle.remove(key.clone()).await?;
            Some(Output::Removed { key, removed })
        }
        Input::Activate { key } => {
            let key: IntentKey = key.parse()?;
            let activated = handle.activate(key.clone()).await?;
            Some(Output::Activated { key, activated })
        }
        Input::Unload { feature } => Some(Output::Unloaded {
            feature,
            unloaded: handle.unload(feature).await?,
        }),
        Input::List => Some(Output::Queue {
            intents: handle.list().await?,
        }),
    };
    Ok(output)
}
