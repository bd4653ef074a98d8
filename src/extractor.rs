//! Binlog 시간 추출기
//!
//! 처리 순서:
//! 1. `SHOW BINARY LOGS` 로 파일 목록과 체크섬 설정 조회
//! 2. 파일마다 복제 세션을 열어 시작 시각과 Previous-GTIDs 수집 (동시 실행 제한)
//! 3. 인접 파일끼리 이어 붙여 종료 시각, 지속 시간, GTID 범위 계산

use crate::binlog_client::{SessionConnector, TcpSessionConnector};
use crate::connection::{BinlogFile, ConnectionConfig, MySqlConnection};
use crate::dispatcher::{self, DispatchOptions};
use crate::error::Result;
use crate::events::ChecksumAlgorithm;
use crate::timeline::{self, BinlogReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 추출기 설정
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    pub connection: ConnectionConfig,
    pub dispatch: DispatchOptions,
}

/// 서버의 모든 binlog 파일에 대한 시간/GTID 보고서를 만듭니다.
pub struct TimeExtractor {
    config: ExtractorConfig,
}

impl TimeExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        TimeExtractor { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<Vec<BinlogReport>> {
        let connection = &self.config.connection;
        info!("Connecting to {}:{}", connection.hostname, connection.port);

        let mut conn = MySqlConnection::connect(connection).await?;
        let catalog = read_catalog(&mut conn).await;
        if let Err(e) = conn.close().await {
            warn!("Failed to close catalog connection: {}", e);
        }
        let (files, checksum) = catalog?;

        info!("SHOW BINARY LOGS done, {} binlogs to analyze", files.len());
        debug!("Server binlog checksum: {:?}", checksum);

        let connector = Arc::new(TcpSessionConnector::new(connection.clone(), checksum));
        extract(connector, &files, &self.config.dispatch).await
    }
}

async fn read_catalog(conn: &mut MySqlConnection) -> Result<(Vec<BinlogFile>, ChecksumAlgorithm)> {
    let files = conn.list_binary_logs().await?;
    let checksum = conn.binlog_checksum().await?;
    Ok((files, checksum))
}

/// 파일 목록을 프로브하고 시간축을 재구성합니다.
pub async fn extract(
    connector: Arc<dyn SessionConnector>,
    files: &[BinlogFile],
    options: &DispatchOptions,
) -> Result<Vec<BinlogReport>> {
    if files.is_empty() {
        info!("No binary logs to analyze");
        return Ok(Vec::new());
    }

    let results = dispatcher::dispatch(connector, files, options).await?;
    info!("All {} binlogs analyzed, reconstructing timeline", results.len());

    timeline::reconstruct(files, &results)
}
