mod cli;

use clap::Parser;
use cli::{Cli, Commands, MutationMethod, PrefsCommand, TargetArgs};
use costdash::client::{ApiClient, Params, RequestOptions};
use costdash::config::Config;
use costdash::locale::Locale;
use costdash::observability::init_tracing;
use costdash::poller::{CallbackListener, JobOutcome, JobProgress, PollerConfig, ScanPoller};
use costdash::preferences::PreferenceStore;
use costdash::scan::{ScanRunner, TriggerFailed};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry);

    let preferences = Arc::new(PreferenceStore::open(&config.preferences.path)?);
    let client = ApiClient::new(&config, Arc::clone(&preferences))?;

    match cli.command {
        Commands::Get(args) => {
            let (params, options) = request_parts(&args.target);
            let value: Value = client.get(&args.endpoint, params, options).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Send(args) => {
            let (params, options) = request_parts(&args.target);
            let body: Option<Value> = args.body.as_deref().map(serde_json::from_str).transpose()?;
            let value: Value = match args.method {
                MutationMethod::Post => client.post(&args.endpoint, body.as_ref(), params, options).await?,
                MutationMethod::Put => client.put(&args.endpoint, body.as_ref(), params, options).await?,
                MutationMethod::Delete => client.delete(&args.endpoint, params, options).await?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Scan(args) => {
            let poller = ScanPoller::new(client.clone(), PollerConfig::from(&config.polling));
            let runner = ScanRunner::new(client.clone(), poller.clone(), config.scan.clone());
            client.select_account(&args.account)?;

            let locale = client.locale();
            let on_terminal = move |job_key: &str, outcome: &JobOutcome| {
                println!("[{}] {}", job_key, outcome.notification(locale));
            };
            let listener = Arc::new(CallbackListener::new(print_progress, on_terminal));
            let handle = match runner.start(&args.account, args.force, listener).await {
                Ok(handle) => handle,
                Err(TriggerFailed { error, handle: Some(handle) }) => {
                    warn!(error = %error, "Scan trigger failed, still polling for progress");
                    handle
                }
                Err(TriggerFailed { error, handle: None }) => return Err(error.into()),
            };

            tokio::select! {
                _ = handle.finished() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping scan polling");
                    poller.shutdown().await;
                    client.shutdown();
                }
            }
        }
        Commands::Prefs(PrefsCommand::Show) => {
            print!("{}", toml::to_string_pretty(&preferences.snapshot())?);
        }
        Commands::Prefs(PrefsCommand::Set { account, locale }) => {
            if let Some(locale) = locale {
                let locale: Locale = locale.parse()?;
                client.select_locale(locale.code())?;
            }
            if let Some(account) = account {
                client.select_account(account)?;
            }
            print!("{}", toml::to_string_pretty(&preferences.snapshot())?);
        }
    }

    Ok(())
}

fn request_parts(target: &TargetArgs) -> (Params, RequestOptions) {
    let mut params: Params = target.params.iter().cloned().collect();
    if let Some(account) = &target.account {
        params.insert("account", Some(account.clone()));
    }
    if let Some(locale) = &target.locale {
        params.insert("locale", Some(locale.clone()));
    }

    let options = RequestOptions::builder()
        .maybe_retries(target.retries)
        .maybe_timeout(target.timeout.map(|t| t.as_duration()))
        .build();

    (params, options)
}

fn print_progress(job_key: &str, progress: &JobProgress) {
    println!(
        "[{}] {:5.1}% {}/{} {} {}",
        job_key,
        progress.percent,
        progress.current,
        progress.total,
        progress.stage.as_deref().unwrap_or("-"),
        progress.message.as_deref().unwrap_or_default(),
    );
}
