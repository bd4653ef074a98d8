//! 파일 하나의 시작 시각과 Previous-GTIDs 추출
//!
//! 서버는 파일 앞쪽에 항상 ROTATE(가짜), FORMAT_DESCRIPTION, PREVIOUS_GTIDS 순으로
//! 이벤트를 보내므로 처음 몇 개만 읽으면 충분합니다.

use crate::binlog_client::{ReplicationSession, SessionConnector};
use crate::error::{ExtractorError, Result};
use crate::events::{BinlogEventData, EventType};
use crate::offset::BinlogPosition;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 기본 읽기 한도: 가짜 ROTATE + FORMAT_DESCRIPTION + PREVIOUS_GTIDS
pub const DEFAULT_MAX_EVENTS: usize = 3;

/// 프로브 설정
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// 파일 앞에서 읽을 최대 이벤트 수
    pub max_events: usize,
    /// 세션 열기부터 읽기 완료까지 하나의 마감 시간 (닫기는 제외)
    pub timeout: Option<Duration>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            max_events: DEFAULT_MAX_EVENTS,
            timeout: None,
        }
    }
}

/// 프로브 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// FORMAT_DESCRIPTION 이벤트의 타임스탬프 (파일 생성 시각)
    pub start_time: Option<u32>,
    /// 이 파일 이전까지의 GTID 집합 (없으면 빈 문자열)
    pub previous_gtids: String,
}

/// 세션을 열고 앞부분 이벤트를 읽은 뒤 항상 세션을 닫습니다.
pub async fn probe(
    connector: &dyn SessionConnector,
    file_name: &str,
    client_id: u32,
    options: ProbeOptions,
) -> Result<ProbeOutcome> {
    let position = BinlogPosition::start_of(file_name);

    let deadline = options.timeout.map(|limit| Instant::now() + limit);
    let expired = || {
        ExtractorError::Timeout(format!(
            "Probing {} exceeded {:?}",
            position,
            options.timeout.unwrap_or_default()
        ))
    };

    let mut session = within(deadline, connector.open(&position, client_id))
        .await
        .ok_or_else(expired)??;

    // 세션은 시간 초과여도 아래에서 닫음
    let outcome = within(deadline, read_leading_events(session.as_mut(), options.max_events))
        .await
        .unwrap_or_else(|| Err(expired()));

    if let Err(e) = session.close().await {
        warn!("Failed to close replication session for {}: {}", file_name, e);
    }

    outcome
}

/// 마감 시각까지 기다림. 초과하면 `None`
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

async fn read_leading_events(
    session: &mut dyn ReplicationSession,
    max_events: usize,
) -> Result<ProbeOutcome> {
    let mut outcome = ProbeOutcome::default();

    for _ in 0..max_events {
        let event = match session.next_event().await? {
            Some(event) => event,
            None => break,
        };

        match event.header.event_type {
            EventType::FormatDescriptionEvent => {
                outcome.start_time = Some(event.header.timestamp);
            }
            EventType::PreviousGtidsEvent => {
                if let BinlogEventData::PreviousGtids(gtids) = event.data {
                    outcome.previous_gtids = gtids;
                }
                break;
            }
            _ => {}
        }
    }

    if outcome.start_time.is_none() {
        debug!("No format description event within the first {} events", max_events);
    }

    Ok(outcome)
}
