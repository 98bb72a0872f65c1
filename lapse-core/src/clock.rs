//! 時刻と待機の抽象化

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 壁時計と待機
///
/// テストでは仮想時間を進める実装に差し替えます。
pub trait Clock {
    /// 現在時刻（Unixエポックからのミリ秒）
    fn now_ms(&self) -> i64;

    /// 指定時間待機する
    fn sleep(&self, duration: Duration);
}

/// システム時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// エクスポーターの停止シグナル
///
/// ティックの境界でのみ確認されます。
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 停止を要求する
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// 停止が要求されたか
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
