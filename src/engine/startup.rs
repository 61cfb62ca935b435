//! Pre-flight checks run once before the polling loop starts.

use secrecy::SecretString;
use tracing::info;

use crate::config::{AppConfig, PolicyConfig};
use crate::service::OfferService;
use crate::types::{BotError, Network, PaymentAccount};

/// Lease used only to prove the wallet password is right.
const PASSWORD_CHECK_LEASE_SECS: u64 = 1;

/// What the loop needs from the daemon before it can start.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupContext {
    pub network: Network,
    pub account: PaymentAccount,
}

/// Ping, resolve network and payment account, and validate the wallet
/// password (skipped when `wallet_password` is `None`, i.e. dry run).
pub async fn run_startup_checks(
    service: &dyn OfferService,
    cfg: &AppConfig,
    policy: &PolicyConfig,
    wallet_password: Option<&SecretString>,
) -> Result<StartupContext, BotError> {
    if !service.is_reachable().await {
        return Err(BotError::ServiceUnreachable(format!(
            "no answer from daemon at {}",
            cfg.daemon.base_url
        )));
    }

    let network = service.get_network().await.map_err(BotError::service)?;
    let account = service
        .get_payment_account(&cfg.market.currency_code)
        .await
        .map_err(BotError::service)?;

    if let Some(password) = wallet_password {
        service
            .unlock_wallet(password, PASSWORD_CHECK_LEASE_SECS)
            .await
            .map_err(|e| BotError::ResourceAcquisition(format!("wallet password rejected: {e:#}")))?;
    }

    log_configuration(cfg, policy, network, &account);
    Ok(StartupContext { network, account })
}

fn log_configuration(
    cfg: &AppConfig,
    policy: &PolicyConfig,
    network: Network,
    account: &PaymentAccount,
) {
    let peers = if policy.has_preferred_peers() {
        policy
            .preferred_peers
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        "N/A".to_string()
    };
    let reference = if network.is_mainnet() {
        "live 30-day average".to_string()
    } else {
        format!("{} (configured)", policy.reference_price)
    };
    let limit = match policy.max_take_count {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };

    info!(
        agent = %cfg.agent.name,
        network = %network,
        market = %cfg.market.description,
        payment_account = %account,
        currency = %cfg.market.currency_code,
        max_take_count = %limit,
        max_fee_rate = policy.max_fee_rate,
        max_price_margin_pct = %policy.max_price_margin_pct,
        reference_price = %reference,
        min_amount = %policy.min_amount,
        max_amount = %policy.max_amount,
        preferred_peers = %peers,
        polling_interval_ms = policy.polling_interval.as_millis() as u64,
        dry_run = cfg.agent.dry_run,
        "Bot configuration"
    );
}
