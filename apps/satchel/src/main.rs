mod activation;
mod backoff;
mod config;
mod events;
mod g711;
mod media;
mod poller;
mod session;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::backoff::ErrorTracker;
use crate::config::ClientConfig;
use crate::events::{LanguageHint, UiUpdate};
use crate::poller::ButtonPoller;
use crate::session::SessionController;

/// Voice homework helper. Press Enter (or the hardware button) to toggle
/// a conversation.
#[derive(Debug, Parser)]
#[command(name = "satchel")]
struct Cli {
    /// Backend base URL (overrides SATCHEL_GATEWAY_URL).
    #[arg(long)]
    gateway: Option<String>,
    /// Hardware bridge base URL (overrides SATCHEL_BRIDGE_URL).
    #[arg(long)]
    bridge: Option<String>,
    /// Activation code (overrides SATCHEL_ACTIVATION_CODE).
    #[arg(long)]
    activation_code: Option<String>,
}

struct App {
    controller: SessionController,
    tracker: ErrorTracker,
    recording: bool,
    /// Failed starts set a cooldown; toggles inside it are refused.
    cooldown_until: Option<Instant>,
    /// Proof of activation, held for the lifetime of the run.
    _activation_token: String,
}

impl App {
    async fn toggle(&mut self) {
        if self.recording {
            self.controller.close().await;
            self.recording = false;
            println!("Recording stopped. Press the button to ask another question.");
            return;
        }

        if let Some(until) = self.cooldown_until {
            let now = Instant::now();
            if now < until {
                let remaining = (until - now).as_secs().max(1);
                println!("Still recovering from an error. Try again in {remaining}s.");
                return;
            }
            self.cooldown_until = None;
        }

        println!("Connecting to your homework helper...");
        match self.controller.start().await {
            Ok(()) => {
                self.tracker.on_success();
                self.recording = true;
                println!("I'm listening! Ask your question out loud.");
            }
            Err(err) => {
                error!(error = %err, "could not start a session");
                let wait = self.tracker.on_failure();
                self.cooldown_until = Some(Instant::now() + wait);
                if self.tracker.in_recovery() {
                    println!("Too many errors in a row. Please wait a little while before trying again.");
                } else {
                    println!("Connection problem: {err}. Try again in {}s.", wait.as_secs());
                }
            }
        }
    }
}

fn render(update: &UiUpdate) {
    match update {
        UiUpdate::Status(status) => println!("[status] {status}"),
        UiUpdate::UserTranscript { text, language } => {
            let tag = match language {
                Some(LanguageHint::Urdu) => " (Urdu)",
                Some(LanguageHint::English) => "",
                None => "",
            };
            println!("You{tag}: {text}");
        }
        UiUpdate::AssistantTranscript(text) => println!("Helper: {text}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(gateway) = cli.gateway {
        config.gateway_url = gateway;
    }
    if let Some(bridge) = cli.bridge {
        config.bridge_url = bridge;
    }
    if let Some(code) = cli.activation_code {
        config.activation_code = Some(code);
    }

    let http = reqwest::Client::new();

    // Startup probe; failure is advisory, sessions may still come up later.
    let probe_url = format!("{}/test", config.gateway_url.trim_end_matches('/'));
    match http
        .get(&probe_url)
        .timeout(config.request_timeout)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => info!("backend reachable"),
        Ok(response) => warn!(status = %response.status(), "backend probe failed"),
        Err(err) => warn!(error = %err, "backend unreachable; sessions will fail until it is up"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let activation_token = activation::run(&http, &config, &mut lines).await?;

    let mut poller = ButtonPoller::new(http, &config.bridge_url);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let mut app = App {
        controller: SessionController::new(config, ui_tx),
        tracker: ErrorTracker::new(),
        recording: false,
        cooldown_until: None,
        _activation_token: activation_token,
    };

    println!("Press Enter (or the hardware button) to start and stop recording.");

    let mut ticker = tokio::time::interval(poller::POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if poller.poll_once().await {
                    app.toggle().await;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(_)) => app.toggle().await,
                Ok(None) | Err(_) => break,
            },
            Some(update) = ui_rx.recv() => render(&update),
        }
    }

    app.controller.close().await;
    Ok(())
}
