//! Outpost - console client for a persistent game server session
//!
//! Connects to the configured server, prints chat and prompts, and reads
//! commands from stdin. All handler and prompt code runs on the consumer
//! loop in this file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use outpost_core::{ClientConfig, DispatchQueue, SimulatedWorld};
use outpost_net::{
    ChatMessage, ClientSession, Endpoint, PacketProcessor, SessionContext, SessionOptions,
    SessionState, WsTransportFactory,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod console;
mod handlers;

use console::{Command, ConsolePrompter, HELP};

/// How long to wait for the close handshake when exiting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "outpost", version, about = "Console client for an Outpost server")]
struct Args {
    /// Config file (defaults to outpost.toml in the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host, overrides the config
    #[arg(long)]
    host: Option<String>,

    /// Server port, overrides the config
    #[arg(short, long)]
    port: Option<u16>,

    /// Name sent in the handshake, overrides the config
    #[arg(short, long)]
    username: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config =
        ClientConfig::load_or_default(args.config.as_deref()).context("Failed to load config")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(username) = args.username {
        config.client.username = username;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();

    info!("Starting Outpost");

    // Network context
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let mut queue = DispatchQueue::new();
    let world = Arc::new(SimulatedWorld::new());
    let prompter = Arc::new(ConsolePrompter::new());

    let processor = Arc::new(
        PacketProcessor::new()
            .with_warn_threshold(config.client.queue_warn_threshold)
            .with_simulated_latency(config.simulated_latency()),
    );
    handlers::register(&processor, world.clone());

    let session = ClientSession::new(
        SessionContext {
            processor,
            transports: Arc::new(WsTransportFactory::new(runtime.handle().clone())),
            dispatcher: queue.dispatcher(),
            world,
            prompter: prompter.clone(),
        },
        SessionOptions {
            username: config.client.username.clone(),
            ..Default::default()
        },
    );

    let endpoint = Endpoint::new(config.server.host.clone(), config.server.port)
        .with_path(config.server.path.clone());
    session.connect_to(endpoint.clone())?;

    let lines = console::spawn_reader().context("Failed to start stdin reader")?;
    println!("{}", HELP);

    let client = Client {
        session: &session,
        prompter: &prompter,
        endpoint,
        username: config.client.username.clone(),
    };
    runtime.block_on(client.run(&mut queue, lines, config.tick_interval()));

    // Let the close handshake finish before tearing the runtime down
    session.disconnect();
    runtime.block_on(async {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while session.state() != SessionState::Idle && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });
    session.shutdown();
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    info!("Outpost stopped");
    Ok(())
}

/// Consumer loop state
struct Client<'a> {
    session: &'a ClientSession,
    prompter: &'a ConsolePrompter,
    endpoint: Endpoint,
    username: String,
}

impl Client<'_> {
    async fn run(
        &self,
        queue: &mut DispatchQueue,
        mut lines: mpsc::UnboundedReceiver<String>,
        tick: Duration,
    ) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.session.tick();
                    queue.run_pending();
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
            }
        }
    }

    /// Returns false when the user asked to exit
    fn handle_line(&self, line: &str) -> bool {
        // An open prompt gets first pick of the input
        if let Some(action) = self.prompter.choose(line) {
            action.invoke();
            return true;
        }

        let Some(command) = Command::parse(line) else {
            return true;
        };

        match command {
            Command::Say(content) => {
                let chat = ChatMessage {
                    sender: self.username.clone(),
                    content,
                    sent_at: Utc::now(),
                };
                if !self.session.is_connected() {
                    println!("Not connected.");
                } else if let Err(e) = self.session.send_packet(&chat) {
                    warn!(error = %e, "Failed to send chat");
                }
            }
            Command::Connect => {
                if let Err(e) = self.session.connect_to(self.endpoint.clone()) {
                    println!("Cannot connect: {}", e);
                }
            }
            Command::Disconnect => self.session.disconnect(),
            Command::Reconnect => {
                if let Err(e) = self.session.reconnect() {
                    println!("Cannot reconnect: {}", e);
                }
            }
            Command::Status => {
                println!(
                    "{:?} to {} (generation {}, {} packets pending)",
                    self.session.state(),
                    self.endpoint,
                    self.session.generation(),
                    self.session.processor().pending()
                );
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return false,
            Command::Unknown(input) => {
                if self.prompter.has_pending() {
                    println!("Pick one of the listed options.");
                } else {
                    println!("Unknown command '{}'. Type 'help'.", input);
                }
            }
        }
        true
    }
}
