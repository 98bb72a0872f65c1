//! ターゲット制御のエラー型

use crate::controller::ThreadOp;
use crate::thread::ThreadId;
use std::io;
use thiserror::Error;

/// 致命的なターゲット制御エラー
#[derive(Debug, Error)]
pub enum TargetError {
    /// プロセスが存在しない、または権限が不足している
    #[error("cannot attach to process {pid}: {source}")]
    Attach {
        pid: i32,
        #[source]
        source: io::Error,
    },

    /// 要求したバイト数を読み取れなかった
    #[error("read of {size} bytes at 0x{address:x} copied only {copied}")]
    MemoryAccess {
        address: usize,
        size: usize,
        copied: usize,
        #[source]
        source: Option<io::Error>,
    },
}

/// 1スレッドの停止・再開に失敗した（致命的ではない）
#[derive(Debug, Error)]
#[error("failed to {op} thread {tid}: {source}")]
pub struct ThreadControlError {
    pub tid: ThreadId,
    pub op: ThreadOp,
    #[source]
    pub source: io::Error,
}

impl ThreadControlError {
    pub fn new(tid: ThreadId, op: ThreadOp, source: impl Into<io::Error>) -> Self {
        Self {
            tid,
            op,
            source: source.into(),
        }
    }
}
