//! Binlog 파일 위치
//!
//! 예: "mysql-bin.000003" 파일의 4 바이트 위치 (첫 이벤트)

use serde::{Deserialize, Serialize};
use std::fmt;

/// 모든 binlog 파일은 4 바이트 매직 넘버 (0xfe 'b' 'i' 'n') 다음부터 이벤트가 시작
pub const FIRST_EVENT_POSITION: u64 = 4;

/// Binlog 파일 위치 정보
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinlogPosition {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl BinlogPosition {
    pub fn new(filename: String, position: u64) -> Self {
        BinlogPosition { filename, position }
    }

    /// 파일의 첫 이벤트 위치
    pub fn start_of(filename: impl Into<String>) -> Self {
        BinlogPosition::new(filename.into(), FIRST_EVENT_POSITION)
    }

    /// 파일명에서 시퀀스 번호 추출
    pub fn file_sequence(&self) -> Option<u64> {
        self.filename
            .rsplit('.')
            .next()
            .and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_of() {
        let pos = BinlogPosition::start_of("mysql-bin.000003");
        assert_eq!(pos.position, 4);
        assert_eq!(pos.to_string(), "mysql-bin.000003:4");
    }

    #[test]
    fn test_file_sequence() {
        assert_eq!(BinlogPosition::start_of("mysql-bin.000042").file_sequence(), Some(42));
        assert_eq!(BinlogPosition::start_of("binlog").file_sequence(), None);
    }
}
