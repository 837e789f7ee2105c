use anyhow::{Context as _, Result};
use std::{io::BufRead as _, sync::Arc};

use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use shadowmc::{
    config::{Command, Config, HashPasswordArgs},
    credentials::{CredentialProvider, CredentialTable, PasswordDigest},
    session::signing_key,
    state::{JsonFileStore, RecordStore as _},
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = shadowmc::config::Cli::parse();
    let cmd = cli.command.clone().unwrap_or(Command::Run);

    match cmd {
        Command::Run => run_server(cli.config).await,
        Command::HashPassword(args) => hash_password(args),
    }
}

async fn run_server(config: Config) -> Result<()> {
    let applications_path = config.applications_path();
    let mut store = JsonFileStore::new(&applications_path);
    store
        .ensure_initialized()
        .with_context(|| format!("initialize {}", applications_path.display()))?;
    let store = shadowmc::state::shared(store);

    let credentials = load_credentials(&config)?;

    if config.session_secret.is_empty() {
        warn!("no session secret configured; using a random cookie signing key");
    }
    let session_key = signing_key(&config.session_secret);

    let bind = config.bind();
    let app = shadowmc::http::build_router(config, store, credentials, session_key)
        .layer(TraceLayer::new_for_http());

    info!(
        bind = %bind,
        applications = %applications_path.display(),
        version = shadowmc::version::VERSION,
        "starting shadowmc"
    );
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn load_credentials(config: &Config) -> Result<Arc<dyn CredentialProvider>> {
    let table = match &config.credentials_file {
        Some(path) => {
            let table = CredentialTable::load(path)
                .with_context(|| format!("load credentials from {}", path.display()))?;
            info!(
                path = %path.display(),
                accounts = table.entries().len(),
                "loaded credentials"
            );
            if table.has_plaintext_secrets() {
                warn!("credentials file contains plaintext passwords; prefer password_hash");
            }
            table
        }
        None => {
            warn!("no credentials file configured; using built-in demo accounts");
            CredentialTable::demo()
        }
    };
    Ok(Arc::new(table))
}

fn hash_password(args: HashPasswordArgs) -> Result<()> {
    let password = match (args.password, args.password_stdin) {
        (Some(password), _) => password,
        (None, true) => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
        (None, false) => anyhow::bail!("pass --password or --password-stdin"),
    };

    let digest = PasswordDigest::hash(&password)?;
    println!("{}", digest.as_str());
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
