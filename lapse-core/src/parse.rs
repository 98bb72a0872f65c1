//! パース関連のユーティリティ関数

use thiserror::Error;

/// 発見ペイロードやコマンドライン引数のパースエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid process id '{0}'")]
    Pid(String),

    #[error("invalid hexadecimal address '{0}'")]
    Address(String),
}

/// 10進数のプロセスIDをパース
///
/// # Examples
/// ```
/// use lapse_core::parse::parse_pid;
///
/// assert_eq!(parse_pid("1234").unwrap(), 1234);
/// assert!(parse_pid("-1").is_err());
/// ```
pub fn parse_pid(s: &str) -> Result<i32, ParseError> {
    let s = s.trim();

    match s.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ParseError::Pid(s.to_string())),
    }
}

/// 16進数のアドレス文字列をパース
///
/// 書き込み側はプレフィックスなしで出力するが、手入力のために0xプレフィックスも受け付ける
///
/// # Examples
/// ```
/// use lapse_core::parse::parse_address;
///
/// assert_eq!(parse_address("7ffd1234").unwrap(), 0x7ffd1234);
/// assert_eq!(parse_address("0x7ffd1234").unwrap(), 0x7ffd1234);
/// ```
pub fn parse_address(s: &str) -> Result<usize, ParseError> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    // from_str_radixは先頭の'+'を受け付けるので、桁だけであることを先に確認する
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::Address(s.to_string()));
    }

    match usize::from_str_radix(digits, 16) {
        Ok(addr) if addr != 0 => Ok(addr),
        _ => Err(ParseError::Address(s.to_string())),
    }
}
