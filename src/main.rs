mod config;
mod error;
mod ethereum;
mod prompt;
mod workflow;

use anyhow::Result;
use clap::{Arg, Command};
use config::Config;
use ethereum::{artifact::ContractArtifact, provider::ChainClient};
use prompt::Prompt;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use workflow::{OtpSession, RunReport};

/// How long shutdown waits for blocking tasks, e.g. a stdin read nobody is
/// waiting on anymore
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    // stdout carries the workflow transcript, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    block_on_detached(runtime, run())
}

/// Run `future` to completion, then shut the runtime down without joining
/// blocking reads that outlived it. Dropping the runtime instead would wait
/// for the operator to press Enter after a prompt timeout or cancellation.
fn block_on_detached<F: Future>(runtime: Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    output
}

async fn run() -> Result<()> {
    let matches = Command::new("otp-auth-demo")
        .version("0.1.0")
        .about("Generate and validate a one-time password through a deployed OTP contract")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("artifact")
                .short('a')
                .long("artifact")
                .value_name("FILE")
                .help("Path to the compiled contract artifact (Truffle JSON)"),
        )
        .arg(
            Arg::new("network-id")
                .short('n')
                .long("network-id")
                .value_name("ID")
                .help("Network id of the deployment inside the artifact"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64))
                .help("Seconds to wait for the OTP to be entered (0 waits forever)"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample()?);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        config.chain.rpc_url = rpc_url.clone();
    }
    if let Some(artifact) = matches.get_one::<String>("artifact") {
        config.artifact.path = artifact.into();
    }
    if let Some(network_id) = matches.get_one::<String>("network-id") {
        config.artifact.network_id = network_id.clone();
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.prompt.timeout_secs = *timeout;
    }

    config.validate()?;

    let artifact =
        match ContractArtifact::load(&config.artifact.path, &config.artifact.network_id).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Failed to load contract artifact: {}", e);
                return Err(e.into());
            }
        };

    let chain = ChainClient::new(&config.chain)?;
    info!("Using RPC endpoint {}", chain.rpc_url());
    if !chain.check_connection().await {
        warn!(
            "Node at {} is not responding, the workflow will report each failing stage",
            chain.rpc_url()
        );
    }

    let prompt = Prompt::stdio(config.prompt.timeout());
    let mut session = OtpSession::new(chain, artifact, &config, prompt, std::io::stdout());
    let report = session.run(shutdown_signal()).await;

    log_summary(&report);
    Ok(())
}

fn log_summary(report: &RunReport) {
    if let Some(status) = report.status.value() {
        debug!(
            "Node at block {} exposes {} accounts, first balance {} wei",
            status.block_number,
            status.accounts.len(),
            status.balance
        );
    }
    if let Some(otp) = report.generation.value() {
        debug!(
            "OTP issued to {} in transaction {}",
            otp.account, otp.transaction_hash
        );
    }
    if let Some(validation) = report.validation.value() {
        debug!(
            "OTP '{}' checked in transaction {}",
            validation.input, validation.transaction_hash
        );
    }
    if let Some(block) = report.block.value() {
        debug!(
            "Reported block {} with {} transactions",
            block.number,
            block.transaction_hashes.len()
        );
    }
    info!("OTP workflow finished: {}", report.final_stage);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_shutdown_does_not_join_abandoned_blocking_reads() {
        let started = Instant::now();

        let output = block_on_detached(runtime(), async {
            // Same shape as tokio's stdin reader parked on a silent terminal
            let _reader =
                tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(30)));
            "done"
        });

        assert_eq!(output, "done");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_shutdown_after_prompt_timeout_returns_promptly() {
        let started = Instant::now();

        let answer = block_on_detached(runtime(), async {
            // A reader that never yields a line, read on the blocking pool
            let (reader_tx, reader_rx) = tokio::sync::oneshot::channel::<String>();
            let _stdin = tokio::task::spawn_blocking(move || {
                std::thread::sleep(Duration::from_secs(30));
                let _ = reader_tx.send(String::new());
            });
            tokio::time::timeout(Duration::from_millis(50), reader_rx).await
        });

        assert!(answer.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
