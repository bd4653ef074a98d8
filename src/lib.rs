//! MySQL Binlog 시간 추출기
//!
//! 서버의 binlog 파일마다 복제 세션을 열어 파일 앞부분만 읽고,
//! 각 파일이 다루는 시간 범위와 GTID 범위를 계산합니다.
//! 주요 기능:
//! - Binlog 복제 프로토콜 (핸드셰이크, COM_BINLOG_DUMP)
//! - FORMAT_DESCRIPTION / PREVIOUS_GTIDS 이벤트 파싱
//! - GTID 집합 연산
//! - 동시 실행 수 제한 아래의 파일별 프로브
//! - 표 / JSON 보고서 출력

pub mod auth;
pub mod binlog;
pub mod binlog_client;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod extractor;
pub mod gtid;
pub mod offset;
pub mod probe;
pub mod protocol;
pub mod report;
pub mod timeline;

pub use binlog_client::{BinlogClient, ReplicationSession, SessionConnector, TcpSessionConnector};
pub use connection::{BinlogFile, ConnectionConfig, MySqlConnection};
pub use dispatcher::{DispatchOptions, ProbeResult};
pub use error::{ExtractorError, Result};
pub use events::{BinlogEvent, BinlogEventData, EventType};
pub use extractor::{ExtractorConfig, TimeExtractor};
pub use gtid::GtidSet;
pub use offset::BinlogPosition;
pub use probe::ProbeOptions;
pub use report::{OutputFormat, RenderOptions, TimeZoneMode};
pub use timeline::BinlogReport;
