//! プロセス外から読み取られる公開バッファ

use crate::schema::{StateRecord, RECORD_SIZE, SEQUENCE_OFFSET};
use crate::Result;
use std::sync::atomic::{fence, AtomicU64, Ordering};

const WORD: usize = 8;
const WORDS: usize = RECORD_SIZE / WORD;
const SEQUENCE_WORD: usize = SEQUENCE_OFFSET / WORD;

/// 状態レコードの公開バッファ
///
/// レコードのバイト列をワード単位のアトミック変数として保持します。
/// ヒープ上に確保されるため、アドレスはバッファの生存期間中は変わりません。
/// 各ワードはネイティブエンディアンで格納されるので、メモリ上のバイト列は
/// エンコード済みのリトルエンディアンのバイト列と一致します。
///
/// 書き込みはシーケンス番号で囲まれます（書き込み中は奇数）。
pub struct SharedRecord {
    words: Box<[AtomicU64; WORDS]>,
    sequence: u64,
}

impl SharedRecord {
    /// 初期レコードで公開バッファを作成する
    pub fn new(initial: &StateRecord) -> Self {
        let mut shared = Self {
            words: Box::new(std::array::from_fn(|_| AtomicU64::new(0))),
            sequence: 0,
        };
        shared.publish(initial);
        shared
    }

    /// バッファの先頭アドレス（他プロセスから読むためのアドレス）
    pub fn address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// 現在のシーケンス番号
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// レコードを書き込む
    ///
    /// `record.sequence` は無視され、バッファが管理する値で上書きされます。
    pub fn publish(&mut self, record: &StateRecord) {
        let writing = self.sequence + 1;
        self.words[SEQUENCE_WORD].store(to_word(&writing.to_le_bytes()), Ordering::Relaxed);
        fence(Ordering::Release);

        let mut encoded = record.clone();
        encoded.sequence = writing;
        let bytes = encoded.encode();
        for (i, chunk) in bytes.chunks_exact(WORD).enumerate() {
            if i != SEQUENCE_WORD {
                self.words[i].store(to_word(chunk), Ordering::Relaxed);
            }
        }

        self.sequence = writing + 1;
        self.words[SEQUENCE_WORD].store(to_word(&self.sequence.to_le_bytes()), Ordering::Release);
    }

    /// バッファの生バイト列を取得する
    pub fn bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        for (i, chunk) in bytes.chunks_exact_mut(WORD).enumerate() {
            chunk.copy_from_slice(&self.words[i].load(Ordering::Acquire).to_ne_bytes());
        }
        bytes
    }

    /// バッファの内容をデコードする
    pub fn snapshot(&self) -> Result<StateRecord> {
        StateRecord::decode(&self.bytes())
    }
}

fn to_word(chunk: &[u8]) -> u64 {
    let mut word = [0u8; WORD];
    word.copy_from_slice(chunk);
    u64::from_ne_bytes(word)
}
