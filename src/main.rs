//! Offer taker entry point.
//!
//! Loads configuration, initialises structured logging, runs the startup
//! checks against the trading daemon and then the polling loop until
//! ctrl-c, the take limit, or a fatal error.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use offer_taker::config::{AppConfig, PolicyConfig};
use offer_taker::dashboard::{self, routes::DashboardState};
use offer_taker::engine::{
    run_startup_checks, LoopExit, PollingLoop, ShutdownSignal, TakeAttemptController,
};
use offer_taker::service::daemon::DaemonClient;
use offer_taker::service::OfferService;
use offer_taker::types::BotError;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("OFFER_TAKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        dry_run = cfg.agent.dry_run,
        "Offer taker starting up"
    );

    // -- Validate policy and secrets -------------------------------------

    let (policy, api_password, wallet_password) = match resolve_inputs(&cfg) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!(error = %e, "Offer taker refused to start");
            return Err(e.into());
        }
    };

    // -- Daemon client + startup checks ------------------------------------

    let client = DaemonClient::new(
        &cfg.daemon.base_url,
        api_password,
        Duration::from_secs(cfg.daemon.request_timeout_secs),
    )?;
    let service: Arc<dyn OfferService> = Arc::new(client);

    let startup =
        run_startup_checks(service.as_ref(), &cfg, &policy, wallet_password.as_ref()).await?;

    // The take call may legitimately block for up to one polling interval.
    let take_timeout = policy.polling_interval;
    let taker = match wallet_password {
        Some(password) => {
            TakeAttemptController::new(password, cfg.daemon.wallet_unlock_secs, take_timeout)
        }
        None => TakeAttemptController::dry_run(take_timeout),
    };

    // -- Shutdown handling -------------------------------------------------

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                shutdown.trigger();
            }
        });
    }

    // -- Loop ----------------------------------------------------------------

    let mut poller = PollingLoop::new(
        service,
        policy.clone(),
        cfg.market.clone(),
        startup.network,
        startup.account,
        taker,
        shutdown,
    );

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            &cfg.agent.name,
            cfg.agent.dry_run,
            policy.max_take_count,
        ));
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
        poller = poller.with_dashboard(state);
    }

    info!("Entering polling loop. Press Ctrl+C to stop.");
    let result = poller.run().await;

    let session = poller.session();
    info!(
        cycles = session.cycles(),
        offers_taken = session.offers_taken(),
        uptime_secs = (chrono::Utc::now() - session.started_at()).num_seconds(),
        "Session summary"
    );
    for receipt in session.receipts() {
        info!(receipt = %receipt, "Taken");
    }

    match result {
        Ok(LoopExit::Shutdown) => info!("Offer taker shut down."),
        Ok(LoopExit::TakeLimitReached) => info!("Take limit reached. Offer taker shut down."),
        Err(e) => {
            error!(error = %e, "Offer taker stopped on fatal error");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Validated policy, API password and (live runs only) wallet password.
fn resolve_inputs(
    cfg: &AppConfig,
) -> Result<(PolicyConfig, SecretString, Option<SecretString>), BotError> {
    let policy = cfg.policy()?;
    let api_password = AppConfig::resolve_secret(&cfg.daemon.api_password_env)?;
    let wallet_password = if cfg.agent.dry_run {
        None
    } else {
        Some(AppConfig::resolve_secret(&cfg.daemon.wallet_password_env)?)
    };
    Ok((policy, api_password, wallet_password))
}

/// Initialise the tracing subscriber.
///
/// Uses JSON format if `OFFER_TAKER_LOG_JSON` is set, otherwise
/// human-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("offer_taker=info"));

    let json_logging = std::env::var("OFFER_TAKER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

