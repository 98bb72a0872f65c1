//! テスト用の模擬ターゲットと模擬プロセス操作
//!
//! 仮想時間で動くエクスポーターを1つ持ち、コントローラの待機に合わせて
//! ティックを進めます。停止中は時間だけが進み、ティックは実行されません。

#![allow(dead_code)]

use lapse_core::{Clock, ExporterConfig, StateExporter};
use lapse_record::{RECORD_SIZE, SEQUENCE_OFFSET};
use lapse_target::{ProcessController, TargetError, ThreadControlError, ThreadOp, ThreadReport};
use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;
use std::time::Duration;

pub const START_MS: i64 = 1_700_000_000_000;
pub const FAKE_TID: i32 = 4242;

/// 共有の仮想時刻
#[derive(Clone)]
pub struct VirtualTime(Rc<Cell<i64>>);

impl Clock for VirtualTime {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }

    fn sleep(&self, duration: Duration) {
        self.0.set(self.0.get() + duration.as_millis() as i64);
    }
}

/// 模擬ターゲット
pub struct SimTarget {
    pub time: VirtualTime,
    pub exporter: StateExporter<VirtualTime>,
    pub suspended: bool,
    /// エクスポーターが次に起きる時刻
    next_wake: i64,
}

impl SimTarget {
    pub fn new(config: ExporterConfig) -> Rc<RefCell<Self>> {
        let time = VirtualTime(Rc::new(Cell::new(START_MS)));
        let exporter = StateExporter::with_clock(config, time.clone());
        // run() と同じく、起動直後に最初のティックを行う
        Rc::new(RefCell::new(Self {
            time,
            exporter,
            suspended: false,
            next_wake: START_MS,
        }))
    }

    pub fn now(&self) -> i64 {
        self.time.now_ms()
    }

    /// 仮想時間を進め、その間に来るティックを実行する
    pub fn advance(&mut self, duration: Duration) {
        let until = self.now() + duration.as_millis() as i64;

        while !self.suspended && self.next_wake <= until {
            self.time.0.set(self.next_wake);
            self.exporter.tick();
            self.next_wake = self.now() + self.exporter.until_next_tick(self.now()).as_millis() as i64;
        }

        self.time.0.set(until);
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// 再開する。停止中に起床時刻を過ぎていれば、再開時刻にすぐ起きる
    pub fn resume(&mut self) {
        self.suspended = false;
        self.next_wake = self.next_wake.max(self.now());
    }

    pub fn bytes(&self) -> [u8; RECORD_SIZE] {
        self.exporter.shared().bytes()
    }
}

/// コントローラ側の時計（待機すると模擬ターゲットの時間が進む）
pub struct SimClock(pub Rc<RefCell<SimTarget>>);

impl Clock for SimClock {
    fn now_ms(&self) -> i64 {
        self.0.borrow().now()
    }

    fn sleep(&self, duration: Duration) {
        self.0.borrow_mut().advance(duration);
    }
}

/// 模擬プロセス操作
pub struct FakeController {
    pub target: Rc<RefCell<SimTarget>>,
    pub attach_calls: u32,
    pub attach_fails: bool,
    /// 唯一のスレッドの停止に失敗させる
    pub suspend_fails: bool,
    /// レコード全体の読み取り回数
    pub record_reads: usize,
    /// この回数目以降のレコード読み取りを失敗させる（0始まり）
    pub fail_record_reads_from: Option<usize>,
    /// 先頭から指定回数のレコード読み取りを書き込み途中に見せる
    pub torn_reads: usize,
    /// 先頭から指定回数のレコード読み取りで、先頭ワードを読んだ直後に
    /// ターゲットが1回ティックする（先頭ワードだけ古い内容になる）
    pub stale_header_reads: usize,
}

impl FakeController {
    pub fn new(target: Rc<RefCell<SimTarget>>) -> Self {
        Self {
            target,
            attach_calls: 0,
            attach_fails: false,
            suspend_fails: false,
            record_reads: 0,
            fail_record_reads_from: None,
            torn_reads: 0,
            stale_header_reads: 0,
        }
    }
}

pub struct FakeHandle {
    pub pid: i32,
}

impl ProcessController for FakeController {
    type Handle = FakeHandle;

    fn attach(&mut self, pid: i32) -> lapse_target::Result<FakeHandle> {
        self.attach_calls += 1;
        if self.attach_fails {
            return Err(TargetError::Attach {
                pid,
                source: io::Error::from_raw_os_error(1),
            });
        }
        Ok(FakeHandle { pid })
    }

    fn read_memory(&mut self, _handle: &FakeHandle, address: usize, size: usize) -> lapse_target::Result<Vec<u8>> {
        let target = self.target.borrow();
        let base = target.exporter.shared().address();
        let offset = address - base;

        if size == RECORD_SIZE {
            let index = self.record_reads;
            self.record_reads += 1;

            if self.fail_record_reads_from.is_some_and(|from| index >= from) {
                return Err(TargetError::MemoryAccess {
                    address,
                    size,
                    copied: 0,
                    source: Some(io::Error::from_raw_os_error(5)),
                });
            }

            let mut bytes = target.bytes().to_vec();
            if self.stale_header_reads > 0 {
                self.stale_header_reads -= 1;
                drop(target);
                self.target.borrow_mut().exporter.tick();
                let fresh = self.target.borrow().bytes();
                bytes[SEQUENCE_OFFSET..].copy_from_slice(&fresh[SEQUENCE_OFFSET..]);
                return Ok(bytes);
            }
            if self.torn_reads > 0 {
                self.torn_reads -= 1;
                // シーケンス番号を奇数にして書き込み中に見せる
                bytes[8] |= 1;
            }
            return Ok(bytes);
        }

        Ok(target.bytes()[offset..offset + size].to_vec())
    }

    fn suspend_all(&mut self, _pid: i32) -> ThreadReport {
        let mut report = ThreadReport::new(ThreadOp::Suspend);
        if self.suspend_fails {
            report.failures.push(ThreadControlError::new(
                FAKE_TID,
                ThreadOp::Suspend,
                io::Error::from_raw_os_error(1),
            ));
        } else {
            self.target.borrow_mut().suspend();
            report.applied.push(FAKE_TID);
        }
        report
    }

    fn resume_all(&mut self, _pid: i32) -> ThreadReport {
        let mut report = ThreadReport::new(ThreadOp::Resume);
        let mut target = self.target.borrow_mut();
        if target.suspended {
            target.resume();
            report.applied.push(FAKE_TID);
        } else {
            report.failures.push(ThreadControlError::new(
                FAKE_TID,
                ThreadOp::Resume,
                io::Error::other("thread was not suspended by this controller"),
            ));
        }
        report
    }
}
