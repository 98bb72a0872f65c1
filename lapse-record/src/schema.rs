//! 状態レコードのバイナリスキーマ
//!
//! すべてのフィールドはリトルエンディアンで、暗黙のパディングはありません。
//!
//! | offset | width | field |
//! |---|---|---|
//! | 0 | 4 | magic `LPSR` |
//! | 4 | 2 | schema version |
//! | 6 | 2 | status length |
//! | 8 | 8 | sequence |
//! | 16 | 8 | iteration count |
//! | 24 | 8 | last update (ms) |
//! | 32 | 4 | suspicion counter |
//! | 36 | 4 | reserved |
//! | 40 | 64 | status bytes |

use crate::Result;
use thiserror::Error;

/// レコード先頭のマジックバイト
pub const RECORD_MAGIC: [u8; 4] = *b"LPSR";

/// 現在のスキーマバージョン
pub const SCHEMA_VERSION: u16 = 1;

/// ステータスメッセージの最大バイト数
pub const STATUS_CAPACITY: usize = 64;

/// レコード全体のバイト数
pub const RECORD_SIZE: usize = 104;

/// シーケンス番号のオフセット
pub const SEQUENCE_OFFSET: usize = 8;

const VERSION_OFFSET: usize = 4;
const STATUS_LEN_OFFSET: usize = 6;
const ITERATION_OFFSET: usize = 16;
const TIMESTAMP_OFFSET: usize = 24;
const SUSPICION_OFFSET: usize = 32;
const STATUS_OFFSET: usize = 40;

/// レコードのデコードエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is {actual} bytes, expected {expected}")]
    Truncated { expected: usize, actual: usize },

    #[error("bad record magic {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u16),

    #[error("status length {0} exceeds capacity {}", STATUS_CAPACITY)]
    StatusOverflow(usize),
}

/// ターゲットが自己観測した生存状態
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateRecord {
    /// 書き込み中は奇数になるシーケンス番号
    pub sequence: u64,
    /// ティック数
    pub iteration_count: u64,
    /// 最後のティック時刻（Unixエポックからのミリ秒）
    pub last_update_ms: i64,
    /// 検出した実行ギャップの数
    pub suspicion_counter: u32,
    status: String,
}

impl StateRecord {
    /// 新しいレコードを作成する
    pub fn new(status: &str) -> Self {
        let mut record = Self::default();
        record.set_status(status);
        record
    }

    /// ステータスメッセージを取得する
    pub fn status(&self) -> &str {
        &self.status
    }

    /// ステータスメッセージを設定する
    ///
    /// 容量を超える場合は文字境界で切り詰めます。
    pub fn set_status(&mut self, status: &str) {
        let mut end = status.len().min(STATUS_CAPACITY);
        while !status.is_char_boundary(end) {
            end -= 1;
        }
        self.status.clear();
        self.status.push_str(&status[..end]);
    }

    /// レコードをバイト列にエンコードする
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        let status = self.status.as_bytes();

        bytes[..VERSION_OFFSET].copy_from_slice(&RECORD_MAGIC);
        put(&mut bytes, VERSION_OFFSET, &SCHEMA_VERSION.to_le_bytes());
        put(&mut bytes, STATUS_LEN_OFFSET, &(status.len() as u16).to_le_bytes());
        put(&mut bytes, SEQUENCE_OFFSET, &self.sequence.to_le_bytes());
        put(&mut bytes, ITERATION_OFFSET, &self.iteration_count.to_le_bytes());
        put(&mut bytes, TIMESTAMP_OFFSET, &self.last_update_ms.to_le_bytes());
        put(&mut bytes, SUSPICION_OFFSET, &self.suspicion_counter.to_le_bytes());
        put(&mut bytes, STATUS_OFFSET, status);

        bytes
    }

    /// バイト列からレコードをデコードする
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RECORD_SIZE {
            return Err(RecordError::Truncated {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }

        let magic: [u8; 4] = field(bytes, 0);
        if magic != RECORD_MAGIC {
            return Err(RecordError::BadMagic(magic));
        }

        let version = u16::from_le_bytes(field(bytes, VERSION_OFFSET));
        if version != SCHEMA_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }

        let status_len = u16::from_le_bytes(field(bytes, STATUS_LEN_OFFSET)) as usize;
        if status_len > STATUS_CAPACITY {
            return Err(RecordError::StatusOverflow(status_len));
        }
        let status = &bytes[STATUS_OFFSET..STATUS_OFFSET + status_len];

        Ok(Self {
            sequence: u64::from_le_bytes(field(bytes, SEQUENCE_OFFSET)),
            iteration_count: u64::from_le_bytes(field(bytes, ITERATION_OFFSET)),
            last_update_ms: i64::from_le_bytes(field(bytes, TIMESTAMP_OFFSET)),
            suspicion_counter: u32::from_le_bytes(field(bytes, SUSPICION_OFFSET)),
            status: String::from_utf8_lossy(status).into_owned(),
        })
    }
}

/// バイト列からシーケンス番号だけを読み取る
pub fn sequence_of(bytes: &[u8]) -> Result<u64> {
    if bytes.len() < SEQUENCE_OFFSET + 8 {
        return Err(RecordError::Truncated {
            expected: SEQUENCE_OFFSET + 8,
            actual: bytes.len(),
        });
    }
    Ok(u64::from_le_bytes(field(bytes, SEQUENCE_OFFSET)))
}

fn put(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

/// 長さは呼び出し側で検証済み
fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
