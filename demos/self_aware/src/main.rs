//! 自己監視するターゲットのサンプルプログラム
//! 起動時に自身のPIDと状態レコードのアドレスを発見ファイルに書き出し、
//! その後は一定間隔で状態を更新し続けます。lapseで停止・再開して、
//! 疑惑カウンタが増えることを確認するために使います。

use anyhow::Result;
use clap::Parser;
use lapse_core::{ExporterConfig, FileChannel, StateExporter, StopSignal};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Self-aware target for lapse
#[derive(Parser)]
#[command(name = "self_aware")]
#[command(about = "Publishes a liveness record and flags gaps in its own execution", long_about = None)]
struct Cli {
    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,

    /// Gap between ticks that counts as a suspension, in milliseconds
    #[arg(long, default_value_t = 2000)]
    threshold_ms: u64,

    /// Directory to write target.pid and target.addr into
    #[arg(long, default_value = ".")]
    discovery_dir: PathBuf,

    /// Stop after this many ticks instead of running until Ctrl-C
    #[arg(long)]
    max_ticks: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ExporterConfig {
        tick: Duration::from_millis(cli.tick_ms),
        threshold: Duration::from_millis(cli.threshold_ms),
        max_ticks: cli.max_ticks,
    };
    let channel = FileChannel::new(&cli.discovery_dir);

    // Ctrl-Cで次のティック境界に停止する
    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.stop();
        }
    });

    let ticks = tokio::task::spawn_blocking(move || -> Result<u64> {
        let mut exporter = StateExporter::new(config);
        let identity = exporter.advertise(&channel)?;

        println!("Target App started. My PID: {}", identity.pid);
        println!("My state is located at memory address: 0x{:x}", identity.state_address);
        println!("Discovery files written to {}", channel.dir().display());
        println!();

        Ok(exporter.run(&stop, |_, record| {
            println!(
                "State: {}, Suspicion: {}",
                record.status(),
                record.suspicion_counter
            );
        }))
    })
    .await??;

    info!("exporter stopped after {} ticks", ticks);
    Ok(())
}
