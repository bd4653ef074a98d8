//! 파일별 프로브를 동시 실행 수 제한 아래에서 돌리고 결과를 원래 순서로 모읍니다.

use crate::binlog_client::SessionConnector;
use crate::connection::BinlogFile;
use crate::error::{ExtractorError, Result};
use crate::probe::{self, ProbeOptions, ProbeOutcome};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// 기본 동시 세션 수
pub const DEFAULT_CONCURRENCY: usize = 5;

/// 합성 레플리카 server_id의 시작 값 (파일 인덱스를 더해 사용)
pub const DEFAULT_SERVER_ID_BASE: u32 = 33061;

/// 디스패처 설정
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub concurrency: usize,
    pub server_id_base: u32,
    pub probe: ProbeOptions,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            concurrency: DEFAULT_CONCURRENCY,
            server_id_base: DEFAULT_SERVER_ID_BASE,
            probe: ProbeOptions::default(),
        }
    }
}

impl DispatchOptions {
    pub fn validate(&self, file_count: usize) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ExtractorError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.server_id_base == 0 {
            return Err(ExtractorError::ConfigError(
                "server id base must be non-zero".to_string(),
            ));
        }
        if self.probe.max_events == 0 {
            return Err(ExtractorError::ConfigError(
                "max events must be at least 1".to_string(),
            ));
        }
        let last_index = file_count.saturating_sub(1) as u64;
        if self.server_id_base as u64 + last_index > u32::MAX as u64 {
            return Err(ExtractorError::ConfigError(format!(
                "server id base {} leaves no room for {} files",
                self.server_id_base, file_count
            )));
        }
        Ok(())
    }
}

/// 파일 하나에 대한 프로브 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// 원래 파일 목록에서의 위치
    pub index: usize,
    pub start_time: Option<u32>,
    pub previous_gtids: String,
}

struct Completion {
    index: usize,
    outcome: Result<ProbeOutcome>,
}

/// 모든 파일을 프로브합니다.
///
/// 실패한 프로브가 있어도 나머지는 끝까지 기다린 뒤, 가장 앞선 파일의 에러를 돌려줍니다.
pub async fn dispatch(
    connector: Arc<dyn SessionConnector>,
    files: &[BinlogFile],
    options: &DispatchOptions,
) -> Result<Vec<ProbeResult>> {
    options.validate(files.len())?;

    let total = files.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let (tx, mut rx) = mpsc::channel::<Completion>(total.max(1));

    // 최신 파일부터 시작 (순서는 결과 배치에 영향 없음)
    let mut handles = Vec::with_capacity(total);
    for (index, file) in files.iter().enumerate().rev() {
        let semaphore = semaphore.clone();
        let connector = connector.clone();
        let tx = tx.clone();
        let file_name = file.name.clone();
        let server_id_base = options.server_id_base;
        let probe_options = options.probe;

        handles.push(tokio::spawn(async move {
            let client_id = server_id_base + index as u32;

            let outcome = match semaphore.acquire_owned().await {
                Ok(permit) => {
                    let outcome =
                        probe::probe(connector.as_ref(), &file_name, client_id, probe_options)
                            .await;
                    drop(permit);
                    outcome
                }
                Err(_) => Err(ExtractorError::TaskError("permit pool closed".to_string())),
            };

            // 수신 측이 사라졌다면 이미 결과를 버린 것
            let _ = tx.send(Completion { index, outcome }).await;
        }));
    }
    drop(tx);

    let mut slots: Vec<Option<Result<ProbeOutcome>>> = (0..total).map(|_| None).collect();
    let mut received = 0;
    while received < total {
        let Some(completion) = rx.recv().await else {
            break;
        };
        received += 1;
        info!(
            "{} done, {} of {} binlogs analyzed",
            files[completion.index].name, received, total
        );
        slots[completion.index] = Some(completion.outcome);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Probe task failed: {}", e);
        }
    }

    let mut first_error = None;
    let mut results = Vec::with_capacity(total);
    for (index, slot) in slots.into_iter().enumerate() {
        let outcome = slot.unwrap_or_else(|| {
            Err(ExtractorError::TaskError(format!(
                "probe task for {} ended without a result",
                files[index].name
            )))
        });

        match outcome {
            Ok(outcome) => results.push(ProbeResult {
                index,
                start_time: outcome.start_time,
                previous_gtids: outcome.previous_gtids,
            }),
            Err(e) => {
                warn!("Failed to probe {}: {}", files[index].name, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(results),
    }
}
