mod args;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use common::address::NeonAccountResolver;
use common::ETH_SIGNATURE_LEN;
use executor::{EthereumTransaction, NeonEvmClient, RpcGateway};
use operator::Operator;
use solana_api::solana_api::SolanaApi;

use self::args::{Command, LogFormat};

#[derive(Parser)]
#[command(version, about = "Executes Ethereum calls through the NEON EVM loader")]
struct Cli {
    #[arg(
        short('u'),
        long,
        env = "SOLANA_URL",
        default_value = "http://127.0.0.1:8899",
        value_name = "URL"
    )]
    /// Solana endpoint
    url: String,

    #[arg(long)]
    /// Wait for finalized instead of confirmed transactions
    finalized: bool,

    #[arg(long, env = "NEON_LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
    /// Log output format
    log_format: LogFormat,

    #[arg(long)]
    /// Address for prometheus metrics
    metrics_addr: Option<SocketAddr>,

    #[group(flatten)]
    executor: executor::Config,

    #[group(flatten)]
    operator: operator::Config,

    #[command(subcommand)]
    command: Command,
}

type Client = NeonEvmClient<RpcGateway, NeonAccountResolver>;

fn init_logs(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logs(cli.log_format);

    if let Some(addr) = cli.metrics_addr {
        solana_api::metrics::metrics().expose(addr)?;
    }

    let operator = Arc::new(Operator::from_config(&cli.operator).context("loading operator")?);
    let solana_api = SolanaApi::new(&cli.url, cli.finalized);
    let gateway = RpcGateway::new(solana_api, operator.clone(), cli.executor.confirm_timeout());
    let resolver = NeonAccountResolver::new(
        cli.executor.evm_loader,
        cli.executor.token_mint,
        cli.executor.seed_version,
    );

    tracing::info!(url = cli.url, program_id = %cli.executor.evm_loader, "starting");
    let client = NeonEvmClient::new(cli.executor, gateway, resolver, operator)
        .context("initializing client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    run(&client, cli.command, &cancel).await
}

async fn run(client: &Client, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::CreateAccount { ether } => {
            let signature = client
                .create_ether_account_cancellable(&ether, cancel)
                .await
                .with_context(|| format!("creating account for {ether}"))?;
            let caller = client.resolve_caller(&ether)?;
            match signature {
                Some(signature) => println!("{} created: {signature}", caller.account),
                None => println!("{} already exists", caller.account),
            }
        }
        Command::Send(send) => {
            let mode = send.mode.unwrap_or_else(|| client.execute_mode());
            let tx = EthereumTransaction::new(
                client.operator().address(),
                send.contract,
                send.code,
                send.data,
            )
            .with_steps(send.steps)
            .with_extra_accounts(send.extra_accounts.into_iter().map(Into::into).collect());

            let executed = match client.send_with_mode_cancellable(&tx, mode, cancel).await {
                Ok(executed) => executed,
                Err(failed) => {
                    if let Some(storage) = failed.storage {
                        tracing::warn!(%storage, "storage account left allocated");
                    }
                    return Err(failed).context("sending transaction");
                }
            };
            if let Some(storage) = executed.context.storage() {
                println!("storage: {storage}");
            }
            for signature in executed.signatures() {
                println!("{signature}");
            }
        }
        Command::StorageAddress { signature_prefix } => {
            let mut signature = [0; ETH_SIGNATURE_LEN];
            signature[..signature_prefix.0.len()].copy_from_slice(&signature_prefix.0);
            let storage = client.storage_account(&signature)?;
            println!("{} (seed {})", storage.pubkey, storage.seed);
        }
        Command::CollateralPool => {
            println!("{}", client.collateral_pool());
        }
    }

    Ok(())
}
