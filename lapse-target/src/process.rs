//! プロセス制御機能

use crate::{Memory, Result, TargetError};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::io;

/// 監視対象プロセスへのハンドル
///
/// メモリ読み取り用に /proc/pid/mem を開いた状態を保持します。
/// アタッチしてもプロセスは停止しません。
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Pid,
    memory: Memory,
}

impl ProcessHandle {
    /// 既存のプロセスを読み取り用に開く
    ///
    /// プロセスが存在しない場合（ESRCH）や権限が不足している場合（EPERM/EACCES）は
    /// `TargetError::Attach` を返します。
    pub fn open(pid: i32) -> Result<Self> {
        let attach_error = |source: io::Error| TargetError::Attach { pid, source };

        if pid <= 0 {
            return Err(attach_error(io::Error::from(io::ErrorKind::InvalidInput)));
        }

        // シグナル0で存在確認のみ行う
        let nix_pid = Pid::from_raw(pid);
        kill(nix_pid, None).map_err(|e| attach_error(e.into()))?;

        let memory = Memory::open(pid).map_err(attach_error)?;

        Ok(Self { pid: nix_pid, memory })
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// メモリアクセスを取得する
    pub fn memory(&self) -> &Memory {
        &self.memory
    }
}
