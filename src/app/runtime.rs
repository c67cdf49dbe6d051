//! Wires settings and secrets into a pipeline and runs the chosen command.

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bookrelay_core::{
    BitwardenSecretProvider, ChromiumLauncher, DeliveryHandoff, EnvSecretProvider, Pipeline,
    SecretProvider, Secrets, SmtpMailTransport, progress_channel,
};
use tracing::{debug, info};

use crate::app::config::{AppSettings, SecretSource};
use crate::app::progress::{finish_progress_ui, spawn_progress_ui};
use crate::app::server::{self, ServerState};
use crate::cli::{Cli, Command, FetchArgs, ServeArgs};

/// Capacity of the progress channel; one slot per phase is plenty.
const PROGRESS_CAPACITY: usize = 16;

/// Runs the parsed command with already-loaded settings.
pub(crate) async fn run(cli: Cli, mut settings: AppSettings) -> Result<()> {
    if let Some(source) = cli.secrets {
        settings.secret_source = source;
    }
    match cli.command {
        Command::Fetch(args) => run_fetch(settings, args, !cli.quiet).await,
        Command::Serve(args) => run_serve(settings, args).await,
    }
}

/// Loads secrets from the configured source; environment values win.
async fn load_secrets(settings: &AppSettings) -> Result<Secrets> {
    let from_env = EnvSecretProvider.load().await?;
    let secrets = match settings.secret_source {
        SecretSource::Env => from_env,
        SecretSource::Bitwarden => {
            let vault = BitwardenSecretProvider::new(settings.bitwarden.clone())
                .load()
                .await
                .context("Failed to fetch secrets from Bitwarden; refusing to start")?;
            from_env.or(vault)
        }
    };
    debug!(?secrets, "secrets loaded");
    Ok(secrets)
}

async fn build_pipeline(settings: &AppSettings, secrets: &Secrets) -> Result<Pipeline> {
    let config = &settings.pipeline;
    if config.mail_account.trim().is_empty() {
        bail!("`mail_account` is not configured. Set it in the config file or BOOKRELAY_MAIL_ACCOUNT.");
    }
    let transport = SmtpMailTransport::new(&config.smtp_host, &config.mail_account, secrets.mail_password()?)?;
    let delivery = DeliveryHandoff::new(Arc::new(transport), config.mail_account.clone(), config.mail_subject.clone());

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("Failed to create download directory '{}'", config.download_dir.display()))?;
    let launcher = Arc::new(ChromiumLauncher::new(config));

    let pipeline = Pipeline::new(config, launcher, delivery, secrets.paid_api_key.clone())?;
    info!(
        mirrors = config.mirrors.len(),
        fallback = pipeline.has_fallback(),
        download_dir = %config.download_dir.display(),
        "pipeline ready"
    );
    Ok(pipeline)
}

async fn run_fetch(mut settings: AppSettings, args: FetchArgs, show_progress: bool) -> Result<()> {
    if let Some(dir) = args.download_dir {
        settings.pipeline.download_dir = dir;
    }
    if args.headed {
        settings.pipeline.headless = false;
    }

    let secrets = load_secrets(&settings).await?;
    let pipeline = build_pipeline(&settings, &secrets).await?;

    let (reporter, receiver) = progress_channel(PROGRESS_CAPACITY);
    let ui = spawn_progress_ui(show_progress && io::stderr().is_terminal(), receiver);
    let result = pipeline.run(&args.source_url, &args.recipient, &reporter).await;
    drop(reporter);
    finish_progress_ui(ui).await;

    match result {
        Ok(()) => {
            info!("success, check your inbox for confirmation");
            Ok(())
        }
        Err(error) => Err(error).context("Book delivery failed"),
    }
}

async fn run_serve(mut settings: AppSettings, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    let secrets = load_secrets(&settings).await?;
    let pipeline = build_pipeline(&settings, &secrets).await?;
    if secrets.api_key.is_none() {
        info!("no API key configured; requests are not authenticated");
    }

    let state = ServerState {
        acquirer: Arc::new(pipeline),
        api_key: secrets.api_key.clone(),
    };
    server::serve(&settings.host, settings.port, state).await
}
