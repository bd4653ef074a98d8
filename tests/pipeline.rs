//! 가짜 복제 세션으로 전체 흐름 확인 (서버 불필요)

use async_trait::async_trait;
use binlog_time_extractor::events::{ChecksumAlgorithm, EventHeader, FormatDescriptionData};
use binlog_time_extractor::extractor::extract;
use binlog_time_extractor::report::{self, OutputFormat, RenderOptions, TimeZoneMode};
use binlog_time_extractor::{
    BinlogEvent, BinlogEventData, BinlogFile, BinlogPosition, DispatchOptions, EventType,
    ExtractorError, ReplicationSession, Result, SessionConnector,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const UUID: &str = "3e11fa47-71ca-11e1-9e33-c80aa9429562";

fn event(event_type: EventType, timestamp: u32, data: BinlogEventData) -> BinlogEvent {
    BinlogEvent {
        header: EventHeader {
            timestamp,
            event_type,
            type_code: event_type as u8,
            server_id: 1,
            event_length: 0,
            next_pos: 0,
            flags: 0,
        },
        data,
    }
}

struct ScriptedSession {
    events: std::vec::IntoIter<BinlogEvent>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl ReplicationSession for ScriptedSession {
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        Ok(self.events.next())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 파일명 -> (FORMAT_DESCRIPTION 시각, Previous-GTIDs)
struct ScriptedServer {
    files: HashMap<String, (u32, String)>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedServer {
    fn new(files: &[(&str, u32, &str)]) -> Self {
        ScriptedServer {
            files: files
                .iter()
                .map(|(name, ts, gtids)| (name.to_string(), (*ts, gtids.to_string())))
                .collect(),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SessionConnector for ScriptedServer {
    async fn open(
        &self,
        position: &BinlogPosition,
        _client_id: u32,
    ) -> Result<Box<dyn ReplicationSession>> {
        let (timestamp, gtids) = self.files.get(&position.filename).cloned().ok_or_else(|| {
            ExtractorError::StreamReadError(format!(
                "Could not find first log file name in binary log index file: {}",
                position.filename
            ))
        })?;

        let events = vec![
            event(EventType::RotateEvent, 0, BinlogEventData::Skipped(0)),
            event(
                EventType::FormatDescriptionEvent,
                timestamp,
                BinlogEventData::FormatDescription(FormatDescriptionData {
                    binlog_version: 4,
                    server_version: "8.0.34".to_string(),
                    create_timestamp: 0,
                    header_length: 19,
                    checksum: ChecksumAlgorithm::Crc32,
                }),
            ),
            event(EventType::PreviousGtidsEvent, timestamp, BinlogEventData::PreviousGtids(gtids)),
        ];

        Ok(Box::new(ScriptedSession {
            events: events.into_iter(),
            closed: self.closed.clone(),
        }))
    }
}

#[tokio::test]
async fn test_extract_and_render_table() {
    let server = Arc::new(ScriptedServer::new(&[
        ("mysql-bin.000001", 1_700_000_000, ""),
        ("mysql-bin.000002", 1_700_001_000, &format!("{}:1-10", UUID)),
        ("mysql-bin.000003", 1_700_004_600, &format!("{}:1-25", UUID)),
    ]));
    let files = vec![
        BinlogFile::new("mysql-bin.000001", 1048576),
        BinlogFile::new("mysql-bin.000002", 2048),
        BinlogFile::new("mysql-bin.000003", 500),
    ];

    let reports = extract(server.clone(), &files, &DispatchOptions::default())
        .await
        .unwrap();
    assert_eq!(server.closed.load(Ordering::SeqCst), 3);

    let options = RenderOptions {
        time_zone: TimeZoneMode::Utc,
        ..Default::default()
    };
    let table = report::render(&reports, &options).unwrap();

    assert!(table.contains("1048576 (1.00 MB)"));
    assert!(table.contains("2048 (2.00 KB)"));
    assert!(table.contains("2023-11-14 22:13:20"));
    assert!(table.contains("00:16:40"));
    assert!(table.contains("01:00:00"));
    assert!(table.contains("11-25"));
}

#[tokio::test]
async fn test_extract_multi_source_json() {
    let other = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";
    let server = Arc::new(ScriptedServer::new(&[
        ("bin.1", 100, &format!("{}:1-50", UUID)),
        ("bin.2", 200, &format!("{}:1-80,{}:1-5", UUID, other)),
        ("bin.3", 300, &format!("{}:1-80,{}:1-5", UUID, other)),
    ]));
    let files = vec![
        BinlogFile::new("bin.1", 1),
        BinlogFile::new("bin.2", 1),
        BinlogFile::new("bin.3", 1),
    ];

    let options = DispatchOptions {
        concurrency: 1,
        ..Default::default()
    };
    let reports = extract(server, &files, &options).await.unwrap();

    assert_eq!(
        reports[0].gtid_delta,
        format!("{}:51-80,{}:1-5", UUID, other)
    );
    // 트랜잭션이 없던 파일
    assert_eq!(reports[1].gtid_delta, "");
    assert_eq!(reports[2].gtid_delta, "");

    let json = report::render(
        &reports,
        &RenderOptions {
            format: OutputFormat::Json,
            time_zone: TimeZoneMode::Utc,
            newest_first: true,
        },
    )
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value[0]["name"], "bin.3");
    assert_eq!(value[2]["end_time"], 200);
}

#[tokio::test]
async fn test_missing_file_fails_whole_run() {
    let server = Arc::new(ScriptedServer::new(&[("bin.1", 100, "")]));
    let files = vec![BinlogFile::new("bin.1", 1), BinlogFile::new("bin.2", 1)];

    let err = extract(server.clone(), &files, &DispatchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractorError::StreamReadError(_)));
    assert_eq!(server.closed.load(Ordering::SeqCst), 1);
}
