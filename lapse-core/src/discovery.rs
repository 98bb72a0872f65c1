//! 発見チャネル
//!
//! エクスポーターが起動時に一度だけ自身のプロセスIDとレコードのアドレスを公開し、
//! コントローラが後から一度だけ読み取ります。プロセス間の同期はありません。
//! 書き込み途中のペイロードを読んだ場合はパースエラーとして扱われ、再試行はしません。

use crate::parse::{parse_address, parse_pid, ParseError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// プロセスIDを書き込むファイル名
pub const PID_FILE: &str = "target.pid";

/// レコードアドレスを書き込むファイル名
pub const ADDR_FILE: &str = "target.addr";

/// 発見ペイロード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: i32,
    pub state_address: usize,
}

impl ProcessIdentity {
    /// ペイロード（10進のPIDと、プレフィックスなし16進のアドレス）に変換する
    pub fn to_payload(&self) -> (String, String) {
        (self.pid.to_string(), format!("{:x}", self.state_address))
    }

    /// ペイロードからパースする
    pub fn from_payload(pid: &str, address: &str) -> Result<Self, ParseError> {
        Ok(Self {
            pid: parse_pid(pid)?,
            state_address: parse_address(address)?,
        })
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} @ 0x{:x}", self.pid, self.state_address)
    }
}

/// 発見エラー
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{name} has not been advertised")]
    Missing { name: String },

    #[error("cannot read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed payload: {0}")]
    Malformed(#[from] ParseError),

    #[error("cannot advertise {name}: {source}")]
    Advertise {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// 発見チャネル
pub trait DiscoveryChannel {
    /// 後から読み取れるように識別情報を保存する
    fn advertise(&self, identity: &ProcessIdentity) -> Result<(), DiscoveryError>;

    /// 保存された識別情報を読み取る
    fn discover(&self) -> Result<ProcessIdentity, DiscoveryError>;
}

impl<T: DiscoveryChannel + ?Sized> DiscoveryChannel for &T {
    fn advertise(&self, identity: &ProcessIdentity) -> Result<(), DiscoveryError> {
        (**self).advertise(identity)
    }

    fn discover(&self) -> Result<ProcessIdentity, DiscoveryError> {
        (**self).discover()
    }
}

/// ファイルベースの発見チャネル
///
/// ディレクトリに `target.pid` と `target.addr` の2ファイルを書きます。
/// プロセス終了後もファイルは残ります（古い識別情報になります）。
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, name: &str, contents: &str) -> Result<(), DiscoveryError> {
        fs::write(self.dir.join(name), contents).map_err(|source| DiscoveryError::Advertise {
            name: name.to_string(),
            source,
        })
    }

    fn read(&self, name: &str) -> Result<String, DiscoveryError> {
        let path = self.dir.join(name);
        fs::read_to_string(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                DiscoveryError::Missing {
                    name: path.display().to_string(),
                }
            } else {
                DiscoveryError::Read {
                    name: path.display().to_string(),
                    source,
                }
            }
        })
    }
}

impl DiscoveryChannel for FileChannel {
    fn advertise(&self, identity: &ProcessIdentity) -> Result<(), DiscoveryError> {
        let (pid, address) = identity.to_payload();
        self.write(PID_FILE, &pid)?;
        self.write(ADDR_FILE, &address)
    }

    fn discover(&self) -> Result<ProcessIdentity, DiscoveryError> {
        let pid = self.read(PID_FILE)?;
        let address = self.read(ADDR_FILE)?;
        Ok(ProcessIdentity::from_payload(&pid, &address)?)
    }
}

/// プロセス内の発見チャネル（テストやコマンドライン指定用）
///
/// ファイルと同じテキストペイロードを保持するので、不正なペイロードも再現できます。
#[derive(Debug, Default)]
pub struct MemoryChannel {
    payload: Mutex<Option<(String, String)>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 識別情報を公開済みのチャネルを作成する
    pub fn advertised(identity: &ProcessIdentity) -> Self {
        Self {
            payload: Mutex::new(Some(identity.to_payload())),
        }
    }

    /// 生のペイロードを持つチャネルを作成する
    pub fn with_payload(pid: &str, address: &str) -> Self {
        Self {
            payload: Mutex::new(Some((pid.to_string(), address.to_string()))),
        }
    }
}

impl DiscoveryChannel for MemoryChannel {
    fn advertise(&self, identity: &ProcessIdentity) -> Result<(), DiscoveryError> {
        let mut payload = self.payload.lock().unwrap_or_else(|e| e.into_inner());
        *payload = Some(identity.to_payload());
        Ok(())
    }

    fn discover(&self) -> Result<ProcessIdentity, DiscoveryError> {
        let payload = self.payload.lock().unwrap_or_else(|e| e.into_inner());
        let (pid, address) = payload.as_ref().ok_or_else(|| DiscoveryError::Missing {
            name: "identity".to_string(),
        })?;
        Ok(ProcessIdentity::from_payload(pid, address)?)
    }
}
