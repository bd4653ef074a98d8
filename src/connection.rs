//! MySQL 데이터베이스 연결 관리 및 binlog 목록 조회

use crate::error::{ExtractorError, Result};
use crate::events::ChecksumAlgorithm;
use crate::offset::BinlogPosition;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Pool, Row};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// MySQL 연결 설정
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    fn build_opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(Some("mysql"))
    }
}

/// SHOW BINARY LOGS 한 행
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinlogFile {
    pub name: String,
    pub size_bytes: u64,
}

impl BinlogFile {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        BinlogFile {
            name: name.into(),
            size_bytes,
        }
    }
}

/// MySQL 연결 래퍼
pub struct MySqlConnection {
    pool: Pool,
    conn: Conn,
}

impl MySqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pool = Pool::new(config.build_opts());

        let conn = tokio::time::timeout(config.timeout, pool.get_conn())
            .await
            .map_err(|_| {
                ExtractorError::CatalogQueryError(format!(
                    "Timed out connecting to {}:{}",
                    config.hostname, config.port
                ))
            })?
            .map_err(|e| {
                ExtractorError::CatalogQueryError(format!("Failed to connect to MySQL: {}", e))
            })?;

        Ok(MySqlConnection { pool, conn })
    }

    /// 서버가 알고 있는 binlog 파일 목록 (오래된 순)
    pub async fn list_binary_logs(&mut self) -> Result<Vec<BinlogFile>> {
        let rows: Vec<Row> = self
            .conn
            .query("SHOW BINARY LOGS")
            .await
            .map_err(|e| {
                ExtractorError::CatalogQueryError(format!(
                    "Failed to execute SHOW BINARY LOGS: {}",
                    e
                ))
            })?;

        let files = rows
            .into_iter()
            .map(binlog_file_from_row)
            .collect::<Result<Vec<_>>>()?;

        check_sequence_order(&files);
        debug!("SHOW BINARY LOGS returned {} files", files.len());
        Ok(files)
    }

    /// 변수 조회
    pub async fn get_variable(&mut self, name: &str) -> Result<Option<String>> {
        let query = format!("SHOW GLOBAL VARIABLES LIKE '{}'", name);
        let result: Vec<(String, String)> = self
            .conn
            .query(&query)
            .await
            .map_err(|e| {
                ExtractorError::CatalogQueryError(format!("Failed to query {}: {}", name, e))
            })?;

        Ok(result.first().map(|(_, v)| v.clone()))
    }

    /// 서버의 binlog 체크섬 설정 (5.6.1 이전 서버는 변수가 없음)
    pub async fn binlog_checksum(&mut self) -> Result<ChecksumAlgorithm> {
        let value = self.get_variable("binlog_checksum").await?;
        Ok(checksum_from_variable(value.as_deref()))
    }

    pub async fn close(self) -> Result<()> {
        drop(self.conn);
        self.pool.disconnect().await?;
        Ok(())
    }
}

fn binlog_file_from_row(row: Row) -> Result<BinlogFile> {
    let name: String = match row.get_opt(0) {
        Some(Ok(name)) => name,
        _ => {
            return Err(ExtractorError::CatalogQueryError(
                "SHOW BINARY LOGS row without Log_name".to_string(),
            ))
        }
    };

    let size: String = match row.get_opt(1) {
        Some(Ok(size)) => size,
        _ => {
            return Err(ExtractorError::CatalogQueryError(format!(
                "SHOW BINARY LOGS row for {} without File_size",
                name
            )))
        }
    };

    let size_bytes = parse_file_size(&size)?;
    Ok(BinlogFile { name, size_bytes })
}

pub fn parse_file_size(size: &str) -> Result<u64> {
    size.trim()
        .parse::<u64>()
        .map_err(|e| ExtractorError::FormatError(format!("Invalid file size '{}': {}", size, e)))
}

fn checksum_from_variable(value: Option<&str>) -> ChecksumAlgorithm {
    match value {
        Some(v) if v.eq_ignore_ascii_case("CRC32") => ChecksumAlgorithm::Crc32,
        Some(_) => ChecksumAlgorithm::Off,
        None => ChecksumAlgorithm::Undefined,
    }
}

/// 파일명 시퀀스가 증가하지 않는 인접 쌍의 인덱스 (앞 파일 기준)
///
/// 목록이 시간순이라는 가정이 깨졌는지 확인하는 용도이며, 시퀀스를 읽을 수 없는 이름은 건너뜁니다.
fn out_of_order_pairs(files: &[BinlogFile]) -> Vec<usize> {
    let sequences: Vec<Option<u64>> = files
        .iter()
        .map(|f| BinlogPosition::start_of(f.name.clone()).file_sequence())
        .collect();

    sequences
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| match pair {
            [Some(prev), Some(next)] if next <= prev => Some(i),
            _ => None,
        })
        .collect()
}

fn check_sequence_order(files: &[BinlogFile]) {
    for i in out_of_order_pairs(files) {
        warn!(
            "Binary log {} does not follow {} in sequence order; timeline may be wrong",
            files[i + 1].name,
            files[i].name
        );
    }
}
