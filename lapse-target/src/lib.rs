//! Lapse ターゲットプロセス制御
//!
//! このクレートは、監視対象プロセスを外部から操作するための低レベル機能を提供します。
//! プロセスメモリの読み取り、スレッドの列挙、ptraceによるスレッド単位の停止・再開などを行います。

pub mod controller;
pub mod error;
pub mod memory;
pub mod process;
pub mod thread;

pub use controller::{LinuxController, ProcessController, ThreadOp, ThreadReport};
pub use error::{TargetError, ThreadControlError};
pub use memory::Memory;
pub use process::ProcessHandle;
pub use thread::{list_threads, Thread, ThreadId};

/// ターゲット制御の結果型
pub type Result<T> = std::result::Result<T, TargetError>;
