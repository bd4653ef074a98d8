//! MySQL Binlog 이벤트 파싱
//!
//! 복제 스트림으로 받은 이벤트의 바이너리 형식을 해석합니다.
//! 각 이벤트:
//!   - Timestamp (4 bytes)
//!   - Type (1 byte)
//!   - Server ID (4 bytes)
//!   - Event Length (4 bytes)
//!   - Next Position (4 bytes)
//!   - Flags (2 bytes)
//!   - Event Data (variable)
//!   - Checksum (CRC32 사용 시 4 bytes)

use crate::error::{ExtractorError, Result};
use crate::events::*;
use crate::gtid::{GtidRange, GtidSet};
use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Buf;
use std::io::Cursor;
use uuid::Uuid;

pub const EVENT_HEADER_SIZE: usize = 19;

/// FORMAT_DESCRIPTION 안의 서버 버전 필드 길이
const SERVER_VERSION_LENGTH: usize = 50;

/// 체크섬 알고리즘 바이트가 FORMAT_DESCRIPTION에 들어간 첫 버전
const CHECKSUM_VERSION: (u32, u32, u32) = (5, 6, 1);

/// Binlog 이벤트 파서
pub struct BinlogParser;

impl BinlogParser {
    /// 이벤트 헤더 파싱
    pub fn parse_header(data: &[u8]) -> Result<(EventHeader, usize)> {
        if data.len() < EVENT_HEADER_SIZE {
            return Err(ExtractorError::ProtocolError(
                "Invalid event header: too short".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let type_code = cursor.read_u8()?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_length = cursor.read_u32::<LittleEndian>()?;
        let next_pos = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        Ok((
            EventHeader {
                timestamp,
                event_type: EventType::from_u8(type_code),
                type_code,
                server_id,
                event_length,
                next_pos,
                flags,
            },
            cursor.position() as usize,
        ))
    }

    /// 이벤트 하나 파싱
    ///
    /// `checksum`은 지금까지 협상/관찰된 알고리즘이며, FORMAT_DESCRIPTION은
    /// 자체 페이로드에서 알고리즘을 읽습니다.
    pub fn parse_event(data: &[u8], checksum: ChecksumAlgorithm) -> Result<BinlogEvent> {
        let (header, offset) = Self::parse_header(data)?;

        let end = (header.event_length as usize).min(data.len());
        if end < offset {
            return Err(ExtractorError::ProtocolError(format!(
                "Event length {} shorter than header",
                header.event_length
            )));
        }
        let body = &data[offset..end];

        let data = match header.event_type {
            EventType::FormatDescriptionEvent => {
                BinlogEventData::FormatDescription(Self::parse_format_description(body)?)
            }
            EventType::PreviousGtidsEvent => {
                let body = strip_checksum(body, checksum)?;
                BinlogEventData::PreviousGtids(Self::parse_previous_gtids(body)?)
            }
            EventType::RotateEvent => {
                let body = strip_checksum(body, checksum)?;
                BinlogEventData::Rotate(Self::parse_rotate_event(body)?)
            }
            _ => BinlogEventData::Skipped(body.len()),
        };

        Ok(BinlogEvent { header, data })
    }

    /// FORMAT_DESCRIPTION 이벤트 파싱 (15)
    pub fn parse_format_description(data: &[u8]) -> Result<FormatDescriptionData> {
        // binlog_version(2) + server_version(50) + create_timestamp(4) + header_length(1)
        let fixed = 2 + SERVER_VERSION_LENGTH + 4 + 1;
        if data.len() < fixed {
            return Err(ExtractorError::ProtocolError(
                "Invalid format description event".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);
        let binlog_version = cursor.read_u16::<LittleEndian>()?;

        let version_bytes = &data[2..2 + SERVER_VERSION_LENGTH];
        let version_end = version_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SERVER_VERSION_LENGTH);
        let server_version = String::from_utf8_lossy(&version_bytes[..version_end]).to_string();

        cursor.set_position((2 + SERVER_VERSION_LENGTH) as u64);
        let create_timestamp = cursor.read_u32::<LittleEndian>()?;
        let header_length = cursor.read_u8()?;

        // 5.6.1 이상: 마지막 5바이트 = 알고리즘(1) + 체크섬(4)
        let checksum = if version_at_least(&server_version, CHECKSUM_VERSION)
            && data.len() >= fixed + 5
        {
            ChecksumAlgorithm::from_u8(data[data.len() - 5])
        } else {
            ChecksumAlgorithm::Undefined
        };

        Ok(FormatDescriptionData {
            binlog_version,
            server_version,
            create_timestamp,
            header_length,
            checksum,
        })
    }

    /// PREVIOUS_GTIDS 이벤트 파싱 (35)
    ///
    /// n_sids(8) + [uuid(16) + n_intervals(8) + [start(8) + end(8, exclusive)]*]*
    pub fn parse_previous_gtids(data: &[u8]) -> Result<String> {
        let mut buf = data;

        ensure_remaining(&buf, 8, "sid count")?;
        let raw_count = buf.get_u64_le();
        if raw_count >> 56 != 0 {
            return Err(ExtractorError::ProtocolError(
                "Tagged GTID encoding is not supported".to_string(),
            ));
        }

        let mut gtid_set = GtidSet::new();
        for _ in 0..raw_count {
            ensure_remaining(&buf, 16 + 8, "sid")?;
            let mut sid = [0u8; 16];
            buf.copy_to_slice(&mut sid);
            let uuid = Uuid::from_bytes(sid).hyphenated().to_string();

            let intervals = buf.get_u64_le();
            for _ in 0..intervals {
                ensure_remaining(&buf, 16, "interval")?;
                let start = buf.get_i64_le();
                let end = buf.get_i64_le();
                if start < 1 || end <= start {
                    return Err(ExtractorError::ProtocolError(format!(
                        "Invalid GTID interval {}-{} for {}",
                        start, end, uuid
                    )));
                }
                let range = GtidRange::new(start as u64, (end - 1) as u64)
                    .map_err(|e| ExtractorError::ProtocolError(e.to_string()))?;
                gtid_set.add_range(&uuid, range);
            }
        }

        Ok(gtid_set.to_string())
    }

    /// ROTATE 이벤트 파싱 (4)
    pub fn parse_rotate_event(data: &[u8]) -> Result<RotateEventData> {
        if data.len() < 8 {
            return Err(ExtractorError::ProtocolError(
                "Invalid rotate event".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        let position = cursor.read_u64::<LittleEndian>()?;
        let filename_bytes = &data[cursor.position() as usize..];
        let filename = String::from_utf8_lossy(filename_bytes).to_string();

        Ok(RotateEventData {
            next_binlog_name: filename,
            position,
        })
    }
}

fn strip_checksum(body: &[u8], checksum: ChecksumAlgorithm) -> Result<&[u8]> {
    let trailer = checksum.trailer_len();
    body.len()
        .checked_sub(trailer)
        .map(|len| &body[..len])
        .ok_or_else(|| ExtractorError::ProtocolError("Event shorter than checksum".to_string()))
}

fn ensure_remaining(buf: &&[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ExtractorError::ProtocolError(format!(
            "Truncated previous GTIDs event while reading {}",
            what
        )));
    }
    Ok(())
}

/// "8.0.34-log" 같은 버전 문자열 비교
pub fn version_at_least(version: &str, min: (u32, u32, u32)) -> bool {
    let mut nums = version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().unwrap_or(0));

    let parsed = (
        nums.next().unwrap_or(0),
        nums.next().unwrap_or(0),
        nums.next().unwrap_or(0),
    );
    parsed >= min
}
