//! 実行時設定
//!
//! 既定値は基準値で、バイナリのコマンドラインフラグで上書きされます。

use std::time::Duration;

/// コントローラの設定
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// ターゲットを停止させておく時間
    pub dwell: Duration,
    /// 再開後、2回目のスナップショットまでの待機時間
    pub settle: Duration,
    /// 書き込み途中のレコードを読んだ場合の最大試行回数
    pub read_attempts: u32,
    /// 再試行の間隔
    pub retry_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(5000),
            settle: Duration::from_millis(1000),
            read_attempts: 8,
            retry_delay: Duration::from_millis(10),
        }
    }
}

/// エクスポーターの設定
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// ティック間隔
    pub tick: Duration,
    /// これを超える間隔を実行ギャップとみなす
    pub threshold: Duration,
    /// 指定した場合、このティック数で終了する
    pub max_ticks: Option<u64>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            threshold: Duration::from_millis(2000),
            max_ticks: None,
        }
    }
}
