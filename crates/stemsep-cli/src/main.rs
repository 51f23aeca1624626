//! stemsep - 投入 API サーバとワーカーの起動口

mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use stemsep_core::app::{Connections, PipelineBuilder, RetryPolicy};
use stemsep_core::config::Settings;
use stemsep_core::impls::CommandTransform;
use stemsep_core::observability::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "stemsep", version, about = "Asynchronous stem-separation pipeline")]
struct Cli {
    /// 設定ファイル（省略時は ./stemsep.toml があれば読む）
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP submission API.
    Serve {
        /// Also run a worker loop in this process.
        #[arg(long)]
        with_worker: bool,
    },
    /// Run the worker loop until SIGINT/SIGTERM.
    Worker,
    /// Submit a local audio file and print the job id.
    Submit {
        file: PathBuf,
        #[arg(long)]
        id: Option<String>,
    },
    /// Show the head of the work queue.
    Queue {
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// submit / queue が依存サービスを待つ回数
const ONE_SHOT_CONNECT_ATTEMPTS: u32 = 3;

impl Command {
    /// 常駐プロセスは無期限に待つ。単発コマンドは諦めてエラーで終わる
    fn connect_policy(&self, delay: Duration) -> RetryPolicy {
        let policy = RetryPolicy::fixed(delay);
        match self {
            Command::Serve { .. } | Command::Worker => policy,
            Command::Submit { .. } | Command::Queue { .. } => {
                policy.with_max_attempts(ONE_SHOT_CONNECT_ATTEMPTS)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(cli.config.as_deref()).context("failed to load settings")?;
    init_tracing(&settings.logging);

    let policy = cli.command.connect_policy(settings.worker.reconnect_delay());
    let conns = Connections::connect(&settings, &policy)
        .await
        .context("failed to connect to dependencies")?;

    match cli.command {
        Command::Serve { with_worker } => serve(settings, conns, with_worker).await,
        Command::Worker => worker(settings, conns).await,
        Command::Submit { file, id } => submit(settings, conns, file, id).await,
        Command::Queue { limit } => queue(settings, conns, limit).await,
    }
}

async fn serve(settings: Settings, conns: Connections, with_worker: bool) -> anyhow::Result<()> {
    let services = PipelineBuilder::new(settings.clone())
        .connections(conns.clone())
        .build_services()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = if with_worker {
        let worker = build_worker(&settings, conns).await?;
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    } else {
        None
    };

    let listener = tokio::net::TcpListener::bind(&settings.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, http::router(services))
        .with_graceful_shutdown(async move {
            wait_for_shutdown().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    if let Some(handle) = worker {
        handle.await?;
    }
    Ok(())
}

async fn worker(settings: Settings, conns: Connections) -> anyhow::Result<()> {
    let worker = build_worker(&settings, conns).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("shutdown requested, finishing current job");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

async fn build_worker(
    settings: &Settings,
    conns: Connections,
) -> anyhow::Result<stemsep_core::app::WorkerLoop> {
    let worker = PipelineBuilder::new(settings.clone())
        .connections(conns)
        .transform(Arc::new(CommandTransform::from_settings(&settings.worker)))
        .build_worker()?;
    worker.prepare().await.with_context(|| {
        format!(
            "failed to prepare work dir {}",
            settings.worker.work_dir.display()
        )
    })?;
    Ok(worker)
}

async fn submit(
    settings: Settings,
    conns: Connections,
    file: PathBuf,
    id: Option<String>,
) -> anyhow::Result<()> {
    let services = PipelineBuilder::new(settings)
        .connections(conns)
        .build_services()?;
    let audio = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let id = services
        .submission
        .submit(Bytes::from(audio), id, None)
        .await?;
    println!("{id}");
    Ok(())
}

async fn queue(settings: Settings, conns: Connections, limit: Option<usize>) -> anyhow::Result<()> {
    let services = PipelineBuilder::new(settings)
        .connections(conns)
        .build_services()?;
    let limit = limit.unwrap_or(services.inspect_limit);

    let entries = services.retrieval.pending(limit).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to capture Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::serve(&["stemsep", "serve"], None)]
    #[case::worker(&["stemsep", "worker"], None)]
    #[case::submit(&["stemsep", "submit", "song.mp3"], Some(ONE_SHOT_CONNECT_ATTEMPTS))]
    #[case::queue(&["stemsep", "queue", "--limit", "5"], Some(ONE_SHOT_CONNECT_ATTEMPTS))]
    fn one_shot_commands_give_up(#[case] argv: &[&str], #[case] expected: Option<u32>) {
        let cli = Cli::try_parse_from(argv).unwrap();
        let policy = cli.command.connect_policy(Duration::from_secs(3));
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, expected);
    }
}
