//! メモリアクセス機能

use crate::{Result, TargetError};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// メモリアクセス
///
/// /proc/pid/mem を読み取り専用で開いたまま保持します。
/// ファイルはこの値がドロップされたときに閉じられます。
#[derive(Debug)]
pub struct Memory {
    pid: i32,
    file: File,
}

impl Memory {
    /// /proc/pid/mem を開く
    pub fn open(pid: i32) -> io::Result<Self> {
        let file = File::open(mem_path(pid))?;
        Ok(Self { pid, file })
    }

    /// 対象のプロセスID
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// メモリからデータを読み取る
    ///
    /// 指定サイズを読み切るまで位置指定読み取りを繰り返します。
    /// 未マップ領域（EIO）や終端で途中までしか読めなかった場合はエラーになります。
    pub fn read(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        let mut copied = 0;
        let mut last_error = None;

        while copied < size {
            match self.file.read_at(&mut buffer[copied..], (addr + copied) as u64) {
                Ok(0) => break,
                Ok(n) => copied += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    last_error = Some(e);
                    break;
                }
            }
        }

        if copied < size {
            return Err(TargetError::MemoryAccess {
                address: addr,
                size,
                copied,
                source: last_error,
            });
        }

        Ok(buffer)
    }
}

fn mem_path(pid: i32) -> String {
    format!("/proc/{}/mem", pid)
}
