//! Lapse 状態レコード
//!
//! このクレートは、ターゲットプロセスが公開する状態レコードのバイナリスキーマを定義します。
//! 書き込み側（エクスポーター）と読み取り側（コントローラ）の両方が同じ定義から
//! ビルドされるため、コンパイラのレイアウトに依存せずにレコードを解釈できます。

pub mod schema;
pub mod shared;

pub use schema::{
    sequence_of, RecordError, StateRecord, RECORD_MAGIC, RECORD_SIZE, SCHEMA_VERSION,
    SEQUENCE_OFFSET, STATUS_CAPACITY,
};
pub use shared::SharedRecord;

/// レコード操作の結果型
pub type Result<T> = std::result::Result<T, RecordError>;
