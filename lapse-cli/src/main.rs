//! Lapse CLI - コントローラ
//!
//! ターゲットを見つけて全スレッドを一時停止し、再開後に状態レコードを比較して
//! ターゲットが停止を検出したかを判定します。

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use lapse_core::{
    ControlError, ControllerConfig, DiscoveryChannel, FileChannel, LinuxController, MemoryChannel,
    ProcessIdentity, RunReport, SnapshotController, StateRecord, Verdict,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Lapse - suspension detection checker
#[derive(Parser)]
#[command(name = "lapse")]
#[command(version = "0.1.0")]
#[command(about = "Suspends a process and checks whether it noticed", long_about = None)]
struct Cli {
    /// Process ID of the target (decimal)
    #[arg(requires = "address")]
    pid: Option<String>,

    /// Address of the target's state record (hexadecimal)
    #[arg(requires = "pid")]
    address: Option<String>,

    /// Directory holding target.pid and target.addr, used when PID and ADDRESS are omitted
    #[arg(long, default_value = ".")]
    discovery_dir: PathBuf,

    /// How long to keep the target suspended, in milliseconds
    #[arg(long, default_value_t = 5000)]
    dwell_ms: u64,

    /// How long to let the target run after resuming, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Attempts per snapshot when the record is caught mid-update
    #[arg(long, default_value_t = 8)]
    read_attempts: u32,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let channel = init_channel(&cli);
    let config = ControllerConfig {
        dwell: Duration::from_millis(cli.dwell_ms),
        settle: Duration::from_millis(cli.settle_ms),
        read_attempts: cli.read_attempts,
        ..ControllerConfig::default()
    };

    println!("Lapse - suspension detection checker");
    println!("Dwell: {} ms, settle: {} ms", cli.dwell_ms, cli.settle_ms);
    println!();

    let mut controller = SnapshotController::new(LinuxController::new(), &*channel, config);
    let report = controller.run()?;
    print_report(&report);

    Ok(())
}

/// RUST_LOGでフィルタ可能なログ出力を設定する（既定はinfo、出力先はstderr）
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 発見チャネルを選ぶ
///
/// 位置引数があればそれを識別情報として使い、なければファイルから読む。
/// 位置引数のパースに失敗した場合は、アタッチする前に使い方を表示して終了する。
fn init_channel(cli: &Cli) -> Box<dyn DiscoveryChannel> {
    match (&cli.pid, &cli.address) {
        (Some(pid), Some(address)) => match ProcessIdentity::from_payload(pid, address) {
            Ok(identity) => {
                debug!("using target {} from the command line", identity);
                Box::new(MemoryChannel::advertised(&identity))
            }
            Err(e) => {
                let err = ControlError::from(e);
                Cli::command().error(ErrorKind::ValueValidation, err).exit()
            }
        },
        _ => {
            debug!("using discovery files in {}", cli.discovery_dir.display());
            Box::new(FileChannel::new(&cli.discovery_dir))
        }
    }
}

fn print_snapshot(title: &str, record: &StateRecord) {
    println!("--- {} ---", title);
    println!("  Iteration Count: {}", record.iteration_count);
    println!("  Timestamp:       {}", record.last_update_ms);
    println!("  Suspicion Level: {}", record.suspicion_counter);
    println!("  Status Message:  \"{}\"", record.status());
    println!("  Sequence:        {}", record.sequence);
    println!();
}

fn print_report(report: &RunReport) {
    println!("Target: {}", report.identity);
    println!();
    print_snapshot("Snapshot 1 (Before Suspend)", &report.before);
    print_snapshot("Snapshot 2 (After Resume)", &report.after);

    println!("--- ANALYSIS ---");
    println!("Suspend: {}", report.suspend);
    println!("Resume:  {}", report.resume);
    if !report.full_coverage() {
        println!("Warning: not every thread was suspended and resumed; treat the verdict with care");
    }

    match report.verdict {
        Verdict::Success => {
            println!("{}: the target detected the suspension.", report.verdict);
            println!(
                "Its suspicion counter increased from {} to {}.",
                report.before.suspicion_counter, report.after.suspicion_counter
            );
        }
        Verdict::Failure => {
            println!(
                "{}: the target did not update its suspicion level.",
                report.verdict
            );
        }
    }
    println!(
        "Iteration count advanced by {} during the run.",
        report.iteration_delta()
    );
}
