//! CLI command implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dialoguer::Password;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::chain::{ChainClient, RestChainClient};
use crate::compound::{spawn_quit_listener, Compounder, Scheduler};
use crate::config::Config;
use crate::error::Error;
use crate::wallet::vault::{decrypt_seed, encrypt_seed, normalize_mnemonic, SessionKey};
use crate::wallet::{resolve_accounts, AddressPrefixes, SeedVault};

fn chain_client(config: &Config) -> Result<Arc<RestChainClient>> {
    let client = RestChainClient::new(
        &config.node.endpoint,
        Duration::from_millis(config.node.timeout_ms),
    )?;
    Ok(Arc::new(client))
}

/// Log label for a failed command
pub fn failure_label(e: &anyhow::Error) -> &'static str {
    match e.downcast_ref::<Error>() {
        Some(err) if err.is_startup_fatal() => "Startup aborted",
        _ => "Command failed",
    }
}

/// Prompt for the root password until a non-blank one is entered
fn prompt_password() -> Result<Zeroizing<String>> {
    loop {
        let password = Zeroizing::new(
            Password::new()
                .with_prompt("Please enter your root password")
                .allow_empty_password(true)
                .interact()
                .context("Failed to read password")?,
        );
        if !password.trim().is_empty() {
            return Ok(password);
        }
    }
}

/// Start the auto-compounder
pub async fn run(config: &Config) -> Result<()> {
    info!("Starting auto-compounder...");
    info!(
        "Minimum withdraw: {} {}, keep unstaked: {} {}, recheck every {}s",
        config.compound.minimum_withdraw,
        config.chain.denom,
        config.compound.keep_unstaked,
        config.chain.denom,
        config.compound.recheck_period_secs
    );

    let client = chain_client(config)?;
    let node = client
        .node_info()
        .await
        .with_context(|| format!("Cannot connect to node at {}", config.node.endpoint))?;
    info!("Connected to {} (network {})", node.moniker, node.network);
    if node.network != config.node.chain_id {
        warn!(
            "Node network '{}' differs from configured chain_id '{}'",
            node.network, config.node.chain_id
        );
    }

    let password = prompt_password()?;
    let mut vault = SeedVault::open(password, &config.accounts.seeds)
        .context("Cannot decrypt seed phrases with the provided password")?;

    let prefixes = AddressPrefixes::new(
        config.chain.account_prefix.clone(),
        config.chain.validator_prefix.clone(),
    );
    let accounts = resolve_accounts(
        &mut vault,
        &prefixes,
        &config.accounts.validators,
        &config.accounts.delegators,
    )
    .context("Account resolution failed")?;
    drop(vault);

    info!("{} account(s) to compound", accounts.len());

    let mut compounder = Compounder::from_config(accounts, client, config);
    let scheduler = Scheduler::new(Duration::from_secs(config.compound.recheck_period_secs));

    let token = scheduler.cancellation_token();
    spawn_quit_listener(token.clone()).context("Failed to start quit listener")?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping after the current cycle");
            token.cancel();
        }
    });

    println!("Press 'Q'+[ENTER] to stop the auto-compounder...");
    scheduler.run(&mut compounder).await;

    info!("Auto-compounder stopped");
    Ok(())
}

/// Encrypt a seed phrase for the `[accounts] seeds` list
pub fn encrypt() -> Result<()> {
    println!("\n=== SEED PHRASE ENCRYPTION ===\n");
    println!("Use the same root password for every seed you want to compound.\n");

    let password = Zeroizing::new(
        Password::new()
            .with_prompt("Root password")
            .with_confirmation("Confirm root password", "Passwords do not match")
            .interact()
            .context("Failed to read password")?,
    );
    if password.trim().is_empty() {
        anyhow::bail!("The root password cannot be blank");
    }

    let phrase = Zeroizing::new(
        Password::new()
            .with_prompt("Seed phrase")
            .interact()
            .context("Failed to read seed phrase")?,
    );

    let key = SessionKey::derive(password.as_str());
    let blob = encrypt_seed(&key, phrase.as_str())?;

    // Refuse to print a blob that would not decrypt back to the same phrase
    let check = decrypt_seed(&key, &blob)?;
    if check.as_str() != normalize_mnemonic(phrase.as_str()) {
        anyhow::bail!("Encryption self-check failed");
    }

    println!("\nEncrypted seed phrase (add it to [accounts] seeds):\n");
    println!("{}", blob);
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check node health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    print!("Node endpoint {}... ", config.node.endpoint);
    let client = chain_client(config)?;

    let start = Instant::now();
    match client.node_info().await {
        Ok(node) => {
            let latency = start.elapsed().as_millis();
            println!("OK ({}ms)", latency);
            println!("  Network : {}", node.network);
            println!("  Moniker : {}", node.moniker);
            println!("  Version : {}", node.version);

            if node.network != config.node.chain_id {
                println!(
                    "\nWARNING: node network '{}' differs from configured chain_id '{}'",
                    node.network, config.node.chain_id
                );
            }
            println!("\nStatus: HEALTHY");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            error!("Health check failed: {}", e);
            println!("\nStatus: UNHEALTHY");
            anyhow::bail!("node unreachable")
        }
    }
}
