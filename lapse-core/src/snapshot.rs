//! スナップショットコントローラ
//!
//! 発見 → アタッチ → スナップショット → 全スレッド停止 → 待機 → 再開 → 待機 →
//! スナップショット → 比較 の順に、厳密に逐次で進むステートマシンです。
//! スレッド単位の停止・再開の失敗は致命的ではなく、ログに残して続行します。
//! それ以外の失敗は実行を中断し、取得済みのハンドルはドロップで解放されます。

use crate::clock::{Clock, SystemClock};
use crate::config::ControllerConfig;
use crate::discovery::{DiscoveryChannel, ProcessIdentity};
use crate::errors::{ControlError, MemoryFault};
use crate::Result;
use lapse_record::{sequence_of, RecordError, StateRecord, RECORD_SIZE, SEQUENCE_OFFSET};
use lapse_target::{ProcessController, ThreadReport};
use std::fmt;
use tracing::{debug, info, warn};

/// コントローラの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Discovering,
    Attached,
    SnapshotBefore,
    Suspended,
    Dwelling,
    Resumed,
    Settling,
    SnapshotAfter,
    Analyzed,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Discovering => "discovery",
            Phase::Attached => "attach",
            Phase::SnapshotBefore => "snapshot before suspend",
            Phase::Suspended => "suspend",
            Phase::Dwelling => "dwell",
            Phase::Resumed => "resume",
            Phase::Settling => "settle",
            Phase::SnapshotAfter => "snapshot after resume",
            Phase::Analyzed => "analysis",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// 判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// ターゲットが停止を検出した
    Success,
    /// 疑惑カウンタが増えなかった
    Failure,
}

impl Verdict {
    /// 2つのスナップショットから判定する
    ///
    /// 疑惑カウンタが増えていれば成功。反復回数は判定に使いません。
    pub fn from_snapshots(before: &StateRecord, after: &StateRecord) -> Self {
        if after.suspicion_counter > before.suspicion_counter {
            Verdict::Success
        } else {
            Verdict::Failure
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "SUCCESS"),
            Verdict::Failure => write!(f, "FAILURE"),
        }
    }
}

/// 1回の実行の結果
#[derive(Debug)]
pub struct RunReport {
    pub identity: ProcessIdentity,
    pub before: StateRecord,
    pub after: StateRecord,
    pub verdict: Verdict,
    pub suspend: ThreadReport,
    pub resume: ThreadReport,
}

impl RunReport {
    /// 反復回数の増分（判定の裏付け）
    pub fn iteration_delta(&self) -> i128 {
        self.after.iteration_count as i128 - self.before.iteration_count as i128
    }

    /// 疑惑カウンタの増分
    pub fn suspicion_delta(&self) -> i64 {
        self.after.suspicion_counter as i64 - self.before.suspicion_counter as i64
    }

    /// すべてのスレッドを停止・再開できたか
    pub fn full_coverage(&self) -> bool {
        self.suspend.is_complete() && self.resume.is_complete()
    }
}

/// スナップショットコントローラ
pub struct SnapshotController<P, D, C = SystemClock> {
    process: P,
    channel: D,
    clock: C,
    config: ControllerConfig,
    phase: Phase,
}

impl<P, D> SnapshotController<P, D, SystemClock>
where
    P: ProcessController,
    D: DiscoveryChannel,
{
    pub fn new(process: P, channel: D, config: ControllerConfig) -> Self {
        Self::with_clock(process, channel, config, SystemClock)
    }
}

impl<P, D, C> SnapshotController<P, D, C>
where
    P: ProcessController,
    D: DiscoveryChannel,
    C: Clock,
{
    pub fn with_clock(process: P, channel: D, config: ControllerConfig, clock: C) -> Self {
        Self {
            process,
            channel,
            clock,
            config,
            phase: Phase::Idle,
        }
    }

    /// 現在（中断した場合は中断時）の状態
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// プロセス操作への参照を取得する
    pub fn process(&self) -> &P {
        &self.process
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// ステートマシンを最後まで実行する
    pub fn run(&mut self) -> Result<RunReport> {
        self.enter(Phase::Discovering);
        let identity = self.channel.discover()?;
        info!("discovered {}", identity);

        self.enter(Phase::Attached);
        let handle = self
            .process
            .attach(identity.pid)
            .map_err(ControlError::Attach)?;
        info!("attached to process {}", identity.pid);

        self.enter(Phase::SnapshotBefore);
        let before = self.read_snapshot(&handle, &identity)?;
        info!(
            "before: iteration {}, suspicion {}",
            before.iteration_count, before.suspicion_counter
        );

        self.enter(Phase::Suspended);
        let suspend = self.process.suspend_all(identity.pid);
        log_thread_report(&suspend);

        self.enter(Phase::Dwelling);
        info!("holding target for {:?}", self.config.dwell);
        self.clock.sleep(self.config.dwell);

        self.enter(Phase::Resumed);
        let resume = self.process.resume_all(identity.pid);
        log_thread_report(&resume);

        self.enter(Phase::Settling);
        self.clock.sleep(self.config.settle);

        self.enter(Phase::SnapshotAfter);
        let after = self.read_snapshot(&handle, &identity)?;
        info!(
            "after: iteration {}, suspicion {}",
            after.iteration_count, after.suspicion_counter
        );

        self.enter(Phase::Analyzed);
        let verdict = Verdict::from_snapshots(&before, &after);
        info!("verdict: {}", verdict);

        self.enter(Phase::Done);
        Ok(RunReport {
            identity,
            before,
            after,
            verdict,
            suspend,
            resume,
        })
    }

    /// レコードを読み取る
    ///
    /// コピーの前後でシーケンス番号のワードを単独で読み、コピー内の値と3つとも
    /// 一致する偶数のときだけ採用します。先頭ワード（マジック・バージョン・
    /// ステータス長）はシーケンス番号より前にあるため、1回のコピー内での
    /// 読み直しだけでは書き込みの割り込みを検出できません。
    fn read_snapshot(&mut self, handle: &P::Handle, identity: &ProcessIdentity) -> Result<StateRecord> {
        let phase = self.phase;
        let fault = |source: MemoryFault| ControlError::MemoryAccess { phase, source };
        let attempts = self.config.read_attempts.max(1);
        let sequence_address = identity.state_address + SEQUENCE_OFFSET;

        for attempt in 1..=attempts {
            let leading = self.read_sequence(handle, sequence_address).map_err(fault)?;

            if leading % 2 == 0 {
                let bytes = self
                    .process
                    .read_memory(handle, identity.state_address, RECORD_SIZE)
                    .map_err(|e| fault(e.into()))?;
                let copied = sequence_of(&bytes).map_err(|e| fault(e.into()))?;
                let trailing = self.read_sequence(handle, sequence_address).map_err(fault)?;

                if copied == leading && trailing == leading {
                    return StateRecord::decode(&bytes).map_err(|e| fault(e.into()));
                }
                debug!(
                    "torn read on attempt {} (sequence {} -> {} -> {})",
                    attempt, leading, copied, trailing
                );
            } else {
                debug!("torn read on attempt {} (sequence {})", attempt, leading);
            }

            if attempt < attempts {
                self.clock.sleep(self.config.retry_delay);
            }
        }

        Err(fault(MemoryFault::Torn { attempts }))
    }

    fn read_sequence(&mut self, handle: &P::Handle, address: usize) -> std::result::Result<u64, MemoryFault> {
        let word = self.process.read_memory(handle, address, 8)?;
        sequence_of_word(&word).ok_or(MemoryFault::Decode(RecordError::Truncated {
            expected: 8,
            actual: word.len(),
        }))
    }
}

/// シーケンス番号の8バイトだけを解釈する
fn sequence_of_word(bytes: &[u8]) -> Option<u64> {
    let word: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(word))
}

fn log_thread_report(report: &ThreadReport) {
    for failure in &report.failures {
        warn!("{}", failure);
    }

    if report.is_complete() {
        info!("{}", report);
    } else {
        warn!("{}; verdict may not be trustworthy", report);
    }
}
