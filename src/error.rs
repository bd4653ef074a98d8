//! 추출기 에러 타입

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("SHOW BINARY LOGS 조회 에러: {0}")]
    CatalogQueryError(String),

    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("Binlog 스트림 읽기 에러: {0}")]
    StreamReadError(String),

    #[error("프로토콜 에러: {0}")]
    ProtocolError(String),

    #[error("GTID 파싱 에러: {0}")]
    GtidParseError(String),

    #[error("포맷 변환 에러: {0}")]
    FormatError(String),

    #[error("설정 에러: {0}")]
    ConfigError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Timeout 에러: {0}")]
    Timeout(String),

    #[error("작업 에러: {0}")]
    TaskError(String),
}

impl From<io::Error> for ExtractorError {
    fn from(err: io::Error) -> Self {
        ExtractorError::IoError(err.to_string())
    }
}

impl From<mysql_async::Error> for ExtractorError {
    fn from(err: mysql_async::Error) -> Self {
        ExtractorError::CatalogQueryError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractorError>;
