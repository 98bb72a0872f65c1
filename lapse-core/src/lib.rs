//! Lapse のコア機能
//!
//! このクレートは、ターゲット側の状態エクスポーターと、
//! コントローラ側のスナップショット取得ステートマシンを提供します。
//! 両者は発見チャネル（プロセスIDとレコードアドレス）だけでつながります。

pub mod clock;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod exporter;
pub mod parse;
pub mod snapshot;

pub use clock::{Clock, StopSignal, SystemClock};
pub use config::{ControllerConfig, ExporterConfig};
pub use discovery::{DiscoveryChannel, DiscoveryError, FileChannel, MemoryChannel, ProcessIdentity};
pub use errors::{ControlError, MemoryFault};
pub use exporter::{StateExporter, Tick};
pub use snapshot::{Phase, RunReport, SnapshotController, Verdict};

// 他のクレートから使用するために再エクスポート
pub use lapse_record::StateRecord;
pub use lapse_target::{LinuxController, ProcessController, ThreadReport};

/// コントローラの結果型
pub type Result<T> = std::result::Result<T, ControlError>;
