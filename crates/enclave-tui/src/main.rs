//! `enclave-chat`: terminal client for the secure enclave chat workflow.
//!
//! ```bash
//! # Interactive TUI against the local development services
//! enclave-chat
//!
//! # Provision keys, then send one prompt, without the TUI
//! enclave-chat ask "hello"
//!
//! # Production hosts
//! enclave-chat --deployment prod --control-plane https://cp.example/api \
//!     --crypto https://crypto.example/api --tee https://tee.example
//! ```

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use enclave_core::api::http_client;
use enclave_core::{
    ChatRole, Config, ControlPlaneClient, DataPlaneClient, Deployment, KeyAction, Session,
};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

/// Secure enclave chat client
#[derive(Parser, Debug)]
#[command(name = "enclave-chat")]
#[command(about = "Provision keys and chat through an encrypted TEE pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Which default hosts to use when no URL is configured
    #[arg(long, value_enum, global = true)]
    deployment: Option<DeploymentArg>,

    /// Control plane base URL (key lifecycle)
    #[arg(long, global = true)]
    control_plane: Option<String>,

    /// Crypto service base URL (encrypt_prompt, decrypt_response)
    #[arg(long, global = true)]
    crypto: Option<String>,

    /// TEE base URL (generate_text)
    #[arg(long, global = true)]
    tee: Option<String>,

    /// Per-request timeout in seconds (default: none)
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the whole key provisioning sequence
    Setup,
    /// Send a single prompt through the pipeline
    Ask {
        prompt: String,
        /// Skip key provisioning and send straight away
        #[arg(long)]
        no_key_check: bool,
    },
    /// Delete all keys on the control plane
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DeploymentArg {
    Dev,
    Prod,
}

impl From<DeploymentArg> for Deployment {
    fn from(arg: DeploymentArg) -> Self {
        match arg {
            DeploymentArg::Dev => Deployment::Development,
            DeploymentArg::Prod => Deployment::Production,
        }
    }
}

impl Cli {
    /// File, then environment, then flags.
    fn config(&self) -> Result<Config> {
        let mut config = Config::load()?;
        if let Some(deployment) = self.deployment {
            config.deployment = deployment.into();
        }
        if let Some(url) = &self.control_plane {
            config.control_plane_url = Some(url.clone());
        }
        if let Some(url) = &self.crypto {
            config.crypto_url = Some(url.clone());
        }
        if let Some(url) = &self.tee {
            config.tee_url = Some(url.clone());
        }
        if let Some(secs) = self.timeout {
            config.request_timeout_secs = Some(secs);
        }
        Ok(config)
    }
}

fn build_clients(config: &Config) -> Result<(ControlPlaneClient, DataPlaneClient)> {
    let endpoints = config.endpoints()?;
    let client = http_client(config.request_timeout())?;
    tracing::info!(
        deployment = config.deployment.as_str(),
        control_plane = %endpoints.control_plane,
        crypto = %endpoints.crypto,
        tee = %endpoints.tee,
        "resolved service endpoints"
    );
    Ok((
        ControlPlaneClient::with_client(client.clone(), &endpoints.control_plane),
        DataPlaneClient::with_client(client, &endpoints.crypto, &endpoints.tee),
    ))
}

/// The TUI owns the terminal, so its logs go to a file next to the config.
fn init_logging(interactive: bool) -> Result<()> {
    if interactive {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let dir = Config::config_dir()?;
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("enclave-chat.log"))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.is_none())?;

    let config = cli.config()?;
    let (control, data) = build_clients(&config)?;

    match cli.command {
        None => run_tui(&config, control, data).await,
        Some(Command::Setup) => {
            let mut session = Session::from_config(&config);
            run_setup(&mut session, &control).await
        }
        Some(Command::Ask { prompt, no_key_check }) => {
            let mut session = if no_key_check {
                Session::new(false)
            } else {
                let mut session = Session::from_config(&config);
                run_setup(&mut session, &control).await?;
                session
            };
            run_ask(&mut session, &data, &prompt).await
        }
        Some(Command::Reset) => {
            let result = KeyAction::DeleteAllKeys.invoke(&control).await;
            if !result.success {
                bail!("{}", result.message);
            }
            println!("{}", KeyAction::DeleteAllKeys.success_notice());
            Ok(())
        }
    }
}

async fn run_setup(session: &mut Session, control: &ControlPlaneClient) -> Result<()> {
    for action in KeyAction::SETUP {
        println!("{}...", action.progress_label());
        let result = session.run_key_action(action, control).await?;
        if !result.success {
            bail!("{} failed: {}", action, result.message);
        }
        println!("  {}", action.success_notice());
    }
    Ok(())
}

async fn run_ask(session: &mut Session, data: &DataPlaneClient, prompt: &str) -> Result<()> {
    session.submit_prompt(prompt, data).await?;

    for message in session.messages() {
        let badge = if message.simulated { " (simulated)" } else { "" };
        println!("[{}{}] {}", message.role.as_str(), badge, message.content);
    }

    if let Some(notice) = session.notice().filter(|n| n.is_error()) {
        eprintln!("warning: {}", notice.text);
    }
    let simulated = session
        .messages()
        .last()
        .is_some_and(|m| m.role == ChatRole::Assistant && m.simulated);
    if simulated {
        bail!("the enclave pipeline did not complete; the reply above is simulated");
    }
    Ok(())
}

async fn run_tui(config: &Config, control: ControlPlaneClient, data: DataPlaneClient) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(Session::from_config(config), config.deployment, control, data, events.sender());

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}
