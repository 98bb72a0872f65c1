//! 状態エクスポーター
//!
//! ターゲットプロセス内で動作し、一定間隔で状態レコードを更新します。
//! 前回のティックからの経過時間が閾値を超えていれば、実行が中断されていたとみなして
//! 疑惑カウンタを1つ増やします。停止がどれだけ長くても、増えるのは再開後最初のティックで1回だけです。

use crate::clock::{Clock, StopSignal, SystemClock};
use crate::config::ExporterConfig;
use crate::discovery::{DiscoveryChannel, DiscoveryError, ProcessIdentity};
use lapse_record::{SharedRecord, StateRecord};
use std::time::Duration;
use tracing::{info, warn};

/// 1ティックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub iteration: u64,
    /// 前回の更新からの経過時間（ミリ秒）
    pub delta_ms: i64,
    /// 実行ギャップを検出したか
    pub suspected: bool,
}

/// 状態エクスポーター
pub struct StateExporter<C: Clock = SystemClock> {
    config: ExporterConfig,
    clock: C,
    record: StateRecord,
    shared: SharedRecord,
    started_ms: i64,
}

impl StateExporter<SystemClock> {
    /// システム時計でエクスポーターを作成する
    pub fn new(config: ExporterConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> StateExporter<C> {
    /// 時計を指定してエクスポーターを作成する
    ///
    /// 最終更新時刻は作成時刻で初期化されるため、最初のティックはギャップになりません。
    pub fn with_clock(config: ExporterConfig, clock: C) -> Self {
        let started_ms = clock.now_ms();
        let mut record = StateRecord::new("Initializing...");
        record.last_update_ms = started_ms;
        let shared = SharedRecord::new(&record);

        Self {
            config,
            clock,
            record,
            shared,
            started_ms,
        }
    }

    /// このプロセスの識別情報
    pub fn identity(&self) -> ProcessIdentity {
        ProcessIdentity {
            pid: std::process::id() as i32,
            state_address: self.shared.address(),
        }
    }

    /// 識別情報を発見チャネルに公開する
    pub fn advertise<D: DiscoveryChannel>(&self, channel: &D) -> Result<ProcessIdentity, DiscoveryError> {
        let identity = self.identity();
        channel.advertise(&identity)?;
        info!("advertised {}", identity);
        Ok(identity)
    }

    /// 現在のレコード
    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    /// 公開バッファ
    pub fn shared(&self) -> &SharedRecord {
        &self.shared
    }

    /// 1ティック分の更新を行う
    pub fn tick(&mut self) -> Tick {
        self.record.iteration_count += 1;
        let iteration = self.record.iteration_count;

        let now = self.clock.now_ms();
        let delta_ms = now - self.record.last_update_ms;
        let suspected = delta_ms > self.config.threshold.as_millis() as i64;

        if suspected {
            self.record.suspicion_counter += 1;
            warn!(
                "time jump of {} ms before iteration {}, suspicion level {}",
                delta_ms, iteration, self.record.suspicion_counter
            );
            let status = format!("Suspicion level: {}", self.record.suspicion_counter);
            self.record.set_status(&status);
        } else {
            self.record.set_status(&format!("Running loop {}", iteration));
        }

        self.record.last_update_ms = now;
        self.shared.publish(&self.record);

        Tick {
            iteration,
            delta_ms,
            suspected,
        }
    }

    /// 次のティック境界までの時間
    ///
    /// 境界は作成時刻を起点にティック間隔ごとに並びます。長い停止の後は、
    /// 取りこぼした境界を飛ばして次の境界まで待ちます。
    pub fn until_next_tick(&self, now_ms: i64) -> Duration {
        let tick_ms = (self.config.tick.as_millis() as i64).max(1);
        let elapsed = (now_ms - self.started_ms).max(0);
        Duration::from_millis((tick_ms - elapsed % tick_ms) as u64)
    }

    /// 停止シグナルを受けるまでティックを繰り返す
    ///
    /// 停止シグナルと `max_ticks` はティック境界でのみ確認されます。
    /// 実行したティック数を返します。
    pub fn run<F>(&mut self, stop: &StopSignal, mut on_tick: F) -> u64
    where
        F: FnMut(&Tick, &StateRecord),
    {
        let mut ticks = 0;

        loop {
            if stop.is_stopped() {
                info!("stop requested after {} ticks", ticks);
                break;
            }
            if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            let tick = self.tick();
            ticks += 1;
            on_tick(&tick, &self.record);

            let wait = self.until_next_tick(self.clock.now_ms());
            self.clock.sleep(wait);
        }

        ticks
    }
}
