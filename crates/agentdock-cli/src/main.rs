//! CLI entry point for agentdock.
//!
//! Each invocation plays one host process lifetime: construct the service
//! over the on-disk durable slot, boot it, run the subcommand, and
//! checkpoint before exiting. `upgrade` additionally destroys the service
//! mid-run and brings up a new one from the checkpoint.

mod cli;
mod config;

use std::sync::Arc;

use agentdock_runtime::{AgentService, CheckpointOutcome};
use agentdock_store::{DATABASE_SLOT, FileSlotStore, SlotStore};
use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    init_tracing(&config.log_level);

    let slots = FileSlotStore::open(config.slot_dir()).context("failed to open durable slots")?;
    let service = boot(&slots, &config).await?;

    match cli.command {
        Commands::Register { name } => {
            let id = service.register_agent(&name).await?;
            println!("Agent \"{name}\" registered with ID {id}.");
        }
        Commands::Unregister { id } => {
            if service.unregister_agent(&id).await? {
                println!("Agent {id} unregistered successfully.");
            } else {
                println!("Agent {id} does not exist.");
            }
        }
        Commands::List { json } => cmd_list(&service, json)?,
        Commands::Show { agent } => cmd_show(&service, &agent).await?,
        Commands::Status => cmd_status(&service, &slots, &config).await?,
        Commands::Upgrade => {
            let service = cmd_upgrade(service, &slots, &config).await?;
            suspend(&service)?;
            return Ok(());
        }
    }

    suspend(&service)
}

// ---------------------------------------------------------------------------
// Host lifecycle
// ---------------------------------------------------------------------------

/// Construct the service and bring it to `Ready`.
///
/// The boot task is started fire-and-forget, as a host constructor would;
/// the explicit `initialize()` afterwards either does the work or waits for
/// the boot task to finish it.
async fn boot(slots: &FileSlotStore, config: &AppConfig) -> Result<Arc<AgentService>> {
    let service = Arc::new(AgentService::new(
        Arc::new(slots.clone()),
        config.runtime.clone(),
    ));
    let _boot = service.spawn_initialize();

    let path = service
        .initialize()
        .await
        .context("failed to initialize agent store")?;
    info!(?path, "agentdock ready");
    Ok(service)
}

fn suspend(service: &AgentService) -> Result<()> {
    match service.on_suspend().context("checkpoint failed")? {
        CheckpointOutcome::Written { bytes } => info!(bytes, "state checkpointed"),
        CheckpointOutcome::Skipped => info!("nothing to checkpoint"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_list(service: &AgentService, json: bool) -> Result<()> {
    if json {
        let body = serde_json::json!({ "agentIds": service.list_agents()? });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let handles = service.list_handles()?;
    if handles.is_empty() {
        println!("No agents registered.");
    }
    for handle in handles {
        println!(
            "{}  {:<12} {}",
            handle.id, handle.model_provider, handle.character.name
        );
    }
    Ok(())
}

async fn cmd_show(service: &AgentService, agent: &str) -> Result<()> {
    let Some(handle) = service.resolve(agent)? else {
        bail!("agent not found: {agent}");
    };
    let record = service
        .agent(&handle.id)
        .await?
        .context("agent is registered but has no stored row")?;

    println!();
    println!("  ID:        {}", record.id);
    println!("  Name:      {}", record.name);
    println!("  Provider:  {}", handle.model_provider);
    println!("  Token:     {}", mask(&record.token));
    println!();
    Ok(())
}

async fn cmd_status(
    service: &AgentService,
    slots: &FileSlotStore,
    config: &AppConfig,
) -> Result<()> {
    let image = slots.get(DATABASE_SLOT)?;
    let registered = service.list_agents()?.len();
    let persisted = service.persisted_ids().await?.len();

    println!();
    println!("  agentdock Status");
    println!("  ================");
    println!();
    println!("  Lifecycle:        {}", service.state());
    println!("  Data directory:   {}", config.data_dir.display());
    println!("  Slot directory:   {}", slots.dir().display());
    match image {
        Some(bytes) => println!("  Durable image:    {} bytes", bytes.len()),
        None => println!("  Durable image:    NONE (first boot)"),
    }
    println!("  Agents (memory):  {registered}");
    println!("  Agents (store):   {persisted}");
    println!("  Default provider: {}", service.config().default_provider);
    println!();
    Ok(())
}

async fn cmd_upgrade(
    service: Arc<AgentService>,
    slots: &FileSlotStore,
    config: &AppConfig,
) -> Result<Arc<AgentService>> {
    let before = service.list_agents()?;
    suspend(&service)?;
    drop(service);
    info!("process destroyed for upgrade");

    let restarted = Arc::new(AgentService::new(
        Arc::new(slots.clone()),
        config.runtime.clone(),
    ));
    let restored = restarted
        .on_resume()
        .await
        .context("restore after upgrade failed")?;
    let after = restarted.list_agents()?;

    println!("Upgrade complete: {restored} agent(s) restored.");
    if before != after {
        bail!(
            "agent set changed across upgrade ({} before, {} after)",
            before.len(),
            after.len()
        );
    }
    Ok(restarted)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Show only the provider prefix and the last four characters of a token.
fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let prefix: String = match token.split_once('-') {
        Some((provider, _)) => format!("{provider}-"),
        None => String::new(),
    };
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix_and_tail() {
        assert_eq!(mask("openai-abcdefghijklmnop"), "openai-****mnop");
        assert_eq!(mask("short"), "*****");
        assert_eq!(mask("nodashtoken123"), "****n123");
    }
}
