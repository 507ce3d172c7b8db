//! Warmup daemon: loads environment configuration, opens the database,
//! wires the engine and runs the periodic scheduler until Ctrl-C.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mailramp::db::{self, seed, Database};
use mailramp::{
    ApiContentGenerator, Config, CredentialCipher, HttpMailSender, ImapChecker, MailboxEndpoint,
    RunEnv, Trigger, WarmupEngine, WarmupScheduler, WarmupSettings,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_tracing();
    info!("Starting mailrampd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            warn!("Configuration problem: {}", problem);
        }
        if config.env == RunEnv::Production {
            error!("Refusing to start in production with incomplete configuration");
            std::process::exit(1);
        }
    }

    let db_path = config
        .database_path
        .clone()
        .or_else(db::default_database_path);
    let db_path = match db_path {
        Some(path) => path,
        None => {
            error!("Could not determine a database path; set MAILRAMP_DATABASE_PATH");
            std::process::exit(1);
        }
    };

    let database = match Database::open(&db_path) {
        Ok(database) => database,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let cipher = match CredentialCipher::from_env() {
        Ok(cipher) => Some(cipher),
        Err(e) => {
            warn!(
                "Credential cipher unavailable ({}); delivery checks will mark messages unknown",
                e
            );
            None
        }
    };

    if let Err(e) = seed::run(&database, &config, cipher.as_ref()) {
        error!("Failed to seed database: {}", e);
        std::process::exit(1);
    }

    let settings = WarmupSettings::from_config(&config);
    let daily_send_time = config.daily_send_time;

    let provider_api_key = config
        .provider_api_key
        .take()
        .unwrap_or_else(|| SecretString::from(""));
    let sender = match HttpMailSender::new(&config.provider_base_url, provider_api_key) {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            error!("Failed to build provider client: {}", e);
            std::process::exit(1);
        }
    };

    // Probe the provider so a bad key or URL surfaces now, not at 09:00.
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => {
            if !rt.block_on(sender.validate_connection()) {
                warn!("Provider API probe failed; sends may not go through");
            }
        }
        Err(e) => warn!("Could not run provider probe: {}", e),
    }

    let checker = Arc::new(ImapChecker::new(MailboxEndpoint {
        host: config.imap_host.clone(),
        port: config.imap_port,
        use_tls: config.imap_use_tls,
    }));

    let generator = Arc::new(ApiContentGenerator::new(
        &config.textgen_base_url,
        &config.textgen_model,
        config.textgen_api_key.take(),
        StdRng::from_entropy(),
    ));

    let engine = WarmupEngine::new(
        database,
        settings,
        sender,
        checker,
        generator,
        cipher,
        StdRng::from_entropy(),
    );

    let scheduler = WarmupScheduler::new(
        Arc::new(tokio::sync::Mutex::new(engine)),
        daily_send_time,
    );
    let (trigger_tx, trigger_rx) = broadcast::channel(16);
    let handle = scheduler.start(trigger_rx);

    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::process::exit(1);
    }

    info!(
        "mailrampd running (daily batch at {} UTC); press Ctrl-C to stop",
        daily_send_time.format("%H:%M")
    );
    let _ = stop_rx.recv();

    info!("Shutting down");
    scheduler.stop();
    // Wake the select loop so it observes the shutdown flag.
    let _ = trigger_tx.send(Trigger::CheckPending);
    if handle.join().is_err() {
        error!("Scheduler thread panicked during shutdown");
    }
}
