//! スレッド管理機能

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::fs;
use std::io;

/// スレッドID
pub type ThreadId = i32;

/// 監視対象のスレッド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thread {
    tid: ThreadId,
}

impl Thread {
    /// スレッドを作成する
    pub fn new(tid: ThreadId) -> Self {
        Self { tid }
    }

    /// スレッドIDを取得する
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// スレッドを停止する
    ///
    /// PTRACE_SEIZEでスレッド単位にトレースを開始し、PTRACE_INTERRUPTで停止させます。
    /// PTRACE_ATTACHと違いSIGSTOPを送らないため、スレッドグループ全体は止まりません。
    /// 停止を待つ間にシグナル配送で止まった場合、そのシグナルを返します
    /// （再開時に再配送する必要があります）。
    pub fn suspend(&self) -> Result<Option<Signal>, Errno> {
        let pid = Pid::from_raw(self.tid);

        ptrace::seize(pid, ptrace::Options::empty())?;

        if let Err(e) = ptrace::interrupt(pid) {
            let _ = ptrace::detach(pid, None);
            return Err(e);
        }

        // スレッドグループリーダー以外を待つには__WALLが必要
        match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::PtraceEvent(_, _, _)) => Ok(None),
            Ok(WaitStatus::Stopped(_, Signal::SIGTRAP)) => Ok(None),
            Ok(WaitStatus::Stopped(_, signal)) => Ok(Some(signal)),
            Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => Err(Errno::ESRCH),
            Ok(_) => {
                let _ = ptrace::detach(pid, None);
                Err(Errno::EAGAIN)
            }
            Err(e) => {
                let _ = ptrace::detach(pid, None);
                Err(e)
            }
        }
    }

    /// 停止中のスレッドを再開する
    ///
    /// PTRACE_DETACHでトレースを解除すると、スレッドは実行を再開します。
    pub fn resume(&self, pending: Option<Signal>) -> Result<(), Errno> {
        ptrace::detach(Pid::from_raw(self.tid), pending)
    }
}

/// /proc/pid/task を読んでプロセスのスレッド一覧を取得する
///
/// 返される一覧は呼び出し時点のスナップショットで、直後に古くなる可能性があります。
pub fn list_threads(pid: i32) -> io::Result<Vec<Thread>> {
    let task_dir = format!("/proc/{}/task", pid);

    let mut threads = Vec::new();
    for entry in fs::read_dir(&task_dir)? {
        let entry = entry?;
        // ディレクトリ名がスレッドID
        if let Some(tid) = entry.file_name().to_str().and_then(|s| s.parse::<ThreadId>().ok()) {
            threads.push(Thread::new(tid));
        }
    }

    threads.sort_by_key(|t| t.tid());
    Ok(threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_threads_of_self() {
        let pid = std::process::id() as i32;

        let handle = std::thread::spawn(|| std::thread::sleep(std::time::Duration::from_millis(200)));
        let threads = list_threads(pid).unwrap();
        handle.join().unwrap();

        assert!(threads.iter().any(|t| t.tid() == pid));
        assert!(threads.len() >= 2);
    }

    #[test]
    fn test_list_threads_missing_process() {
        assert!(list_threads(i32::MAX).is_err());
    }
}
