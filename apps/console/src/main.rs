use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{config, ControllerEvent, InteractionController};
use shared::domain::{TransferIntent, TxRequest};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "chaos", about = "Interact with a ChaosCoin deployment from the terminal")]
struct Cli {
    /// Wallet JSON-RPC endpoint; overrides chaos.toml and CHAOS_RPC_URL.
    #[arg(long)]
    rpc_url: Option<String>,
    /// Contract address; overrides chaos.toml and CHAOS_CONTRACT_ADDRESS.
    #[arg(long)]
    contract: Option<String>,
    /// Settings file to read instead of ./chaos.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and print balance, opt-in flag and batch status.
    Status,
    Request,
    OptIn,
    ExecuteBatch,
    Transfer {
        #[arg(long)]
        to: String,
        /// Decimal token amount, e.g. 2.5
        #[arg(long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => config::load_settings_from(path)?,
        None => config::load_settings(),
    };
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = Some(rpc_url);
    }
    if let Some(contract) = cli.contract {
        settings.contract_address = Some(contract);
    }

    let controller = settings.build_controller()?;
    let printer = tokio::spawn(print_notifications(BroadcastStream::new(
        controller.subscribe_events(),
    )));

    let result = run(&controller, cli.command).await;
    drop(controller);
    printer.await?;
    result
}

async fn run(controller: &InteractionController, command: Command) -> Result<()> {
    let account = controller.connect().await?;
    if let Some(session) = controller.session() {
        println!("account {}", session.address);
    }

    let request = match command {
        Command::Status => {
            let status = controller.contract_status().await?;
            println!("balance     {} CHAOS", account.balance());
            println!("opted in    {}", account.opted_in);
            println!("executed    {}", status.chaos_executed);
            match status.last_executed_at() {
                Some(at) => println!("last batch  {at}"),
                None => println!("last batch  never"),
            }
            return Ok(());
        }
        Command::Request => TxRequest::RequestChaos,
        Command::OptIn => TxRequest::OptInToChaos,
        Command::ExecuteBatch => TxRequest::ExecuteChaosBatch,
        Command::Transfer { to, amount } => TxRequest::Transfer(TransferIntent::new(to, amount)),
    };

    let pending = controller.submit(request).await?;
    println!("transaction {}", pending.hash);
    println!("balance     {} CHAOS", controller.current().balance());
    Ok(())
}

async fn print_notifications(mut events: BroadcastStream<ControllerEvent>) {
    while let Some(event) = events.next().await {
        match event {
            Ok(ControllerEvent::Outcome(outcome)) => println!("{}", outcome.message()),
            Ok(ControllerEvent::RefreshFailed(err)) => {
                println!("Transaction confirmed, but the balance could not be refreshed: {err}")
            }
            Ok(ControllerEvent::TransactionSubmitted(pending)) => {
                println!("submitted {} {}, waiting for confirmation", pending.verb, pending.hash)
            }
            Ok(_) => {}
            Err(err) => warn!("console: notification stream lagged: {err}"),
        }
    }
}
