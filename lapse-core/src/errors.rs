//! コントローラのエラー型

use crate::discovery::DiscoveryError;
use crate::parse::ParseError;
use crate::snapshot::Phase;
use lapse_record::RecordError;
use lapse_target::TargetError;
use thiserror::Error;

/// コントローラ実行を中断する致命的エラー
#[derive(Debug, Error)]
pub enum ControlError {
    /// コマンドライン引数が不正
    #[error("invalid argument: {0}")]
    Argument(#[from] ParseError),

    /// 発見ペイロードが存在しない、またはパースできない
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// プロセスを開けない
    #[error("attach failed: {0}")]
    Attach(#[source] TargetError),

    /// スナップショットを取得できない（1回目と2回目で同じ扱い）
    #[error("{phase} failed: {source}")]
    MemoryAccess {
        phase: Phase,
        #[source]
        source: MemoryFault,
    },
}

/// スナップショット読み取りの失敗理由
#[derive(Debug, Error)]
pub enum MemoryFault {
    #[error(transparent)]
    Read(#[from] TargetError),

    /// 書き込み中の状態しか観測できなかった
    #[error("record was being written on all {attempts} attempts")]
    Torn { attempts: u32 },

    #[error("record bytes are not a state record: {0}")]
    Decode(#[from] RecordError),
}
