//! プロセス操作の抽象化
//!
//! 上位のオーケストレーションはこのトレイトだけに依存するため、
//! テストではアタッチ・読み取り・停止・再開の結果を模擬する実装に差し替えられます。

use crate::error::ThreadControlError;
use crate::thread::{list_threads, Thread, ThreadId};
use crate::{ProcessHandle, Result};
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// スレッド操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadOp {
    Suspend,
    Resume,
}

impl fmt::Display for ThreadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadOp::Suspend => write!(f, "suspend"),
            ThreadOp::Resume => write!(f, "resume"),
        }
    }
}

/// ベストエフォートなスレッド操作の結果
#[derive(Debug)]
pub struct ThreadReport {
    pub op: ThreadOp,
    /// 操作に成功したスレッド
    pub applied: Vec<ThreadId>,
    /// 操作に失敗したスレッド
    pub failures: Vec<ThreadControlError>,
}

impl ThreadReport {
    pub fn new(op: ThreadOp) -> Self {
        Self {
            op,
            applied: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// 列挙したすべてのスレッドに適用できたか
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// 列挙されたスレッド数
    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failures.len()
    }
}

impl fmt::Display for ThreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied to {}/{} threads",
            self.op,
            self.applied.len(),
            self.attempted()
        )
    }
}

/// 外部プロセスを操作する能力
pub trait ProcessController {
    /// アタッチ済みプロセスのハンドル（ドロップで解放される）
    type Handle;

    /// プロセスを読み取り用に開く
    fn attach(&mut self, pid: i32) -> Result<Self::Handle>;

    /// プロセスメモリを `size` バイト読み取る
    fn read_memory(&mut self, handle: &Self::Handle, address: usize, size: usize) -> Result<Vec<u8>>;

    /// 呼び出し時点のすべてのスレッドを停止する（ベストエフォート）
    fn suspend_all(&mut self, pid: i32) -> ThreadReport;

    /// 呼び出し時点のすべてのスレッドを再開する（ベストエフォート）
    fn resume_all(&mut self, pid: i32) -> ThreadReport;
}

/// Linux実装（/proc と ptrace）
///
/// 停止したスレッドはトレース状態のまま保持され、再開時にデタッチされます。
/// コントローラがドロップされると、保持中のスレッドはすべてデタッチされます。
#[derive(Debug, Default)]
pub struct LinuxController {
    /// 停止中のスレッドと再配送すべきシグナル
    held: HashMap<ThreadId, Option<Signal>>,
}

impl LinuxController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在停止させているスレッド数
    pub fn held_count(&self) -> usize {
        self.held.len()
    }
}

impl ProcessController for LinuxController {
    type Handle = ProcessHandle;

    fn attach(&mut self, pid: i32) -> Result<ProcessHandle> {
        ProcessHandle::open(pid)
    }

    fn read_memory(&mut self, handle: &ProcessHandle, address: usize, size: usize) -> Result<Vec<u8>> {
        handle.memory().read(address, size)
    }

    fn suspend_all(&mut self, pid: i32) -> ThreadReport {
        let mut report = ThreadReport::new(ThreadOp::Suspend);

        let threads = match list_threads(pid) {
            Ok(threads) => threads,
            Err(e) => {
                report.failures.push(ThreadControlError::new(pid, ThreadOp::Suspend, e));
                return report;
            }
        };

        for thread in threads {
            let tid = thread.tid();
            if self.held.contains_key(&tid) {
                report.applied.push(tid);
                continue;
            }

            match thread.suspend() {
                Ok(pending) => {
                    debug!("suspended thread {} (pending signal: {:?})", tid, pending);
                    self.held.insert(tid, pending);
                    report.applied.push(tid);
                }
                Err(e) => {
                    report.failures.push(ThreadControlError::new(tid, ThreadOp::Suspend, e));
                }
            }
        }

        report
    }

    fn resume_all(&mut self, pid: i32) -> ThreadReport {
        let mut report = ThreadReport::new(ThreadOp::Resume);

        let threads = match list_threads(pid) {
            Ok(threads) => threads,
            Err(e) if self.held.is_empty() => {
                report.failures.push(ThreadControlError::new(pid, ThreadOp::Resume, e));
                return report;
            }
            Err(e) => {
                // 保持中のスレッドは下でデタッチして報告する
                warn!("cannot enumerate threads of {}: {}", pid, e);
                Vec::new()
            }
        };

        for thread in threads {
            let tid = thread.tid();
            let Some(pending) = self.held.remove(&tid) else {
                // 列挙後に生成された、または停止に失敗したスレッド
                report.failures.push(ThreadControlError::new(
                    tid,
                    ThreadOp::Resume,
                    io::Error::other("thread was not suspended by this controller"),
                ));
                continue;
            };
            release(&mut report, &thread, pending);
        }

        // 列挙に現れなかった保持中のスレッド
        for (tid, pending) in self.held.drain() {
            debug!("releasing thread {} missing from enumeration", tid);
            release(&mut report, &Thread::new(tid), pending);
        }

        report
    }
}

/// 保持中のスレッドをデタッチし、結果を報告に積む
fn release(report: &mut ThreadReport, thread: &Thread, pending: Option<Signal>) {
    let tid = thread.tid();
    match thread.resume(pending) {
        Ok(()) => {
            debug!("resumed thread {}", tid);
            report.applied.push(tid);
        }
        Err(e) => {
            report.failures.push(ThreadControlError::new(tid, ThreadOp::Resume, e));
        }
    }
}

impl Drop for LinuxController {
    fn drop(&mut self) {
        for (tid, pending) in self.held.drain() {
            if let Err(e) = Thread::new(tid).resume(pending) {
                warn!("failed to release thread {} on drop: {}", tid, e);
            }
        }
    }
}
