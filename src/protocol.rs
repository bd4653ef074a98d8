//! MySQL 프로토콜 패킷 처리
//!
//! 3바이트 길이 + 1바이트 시퀀스 헤더로 구성된 패킷을 읽고 씁니다.

use crate::error::{ExtractorError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// 한 패킷에 담을 수 있는 최대 페이로드
const MAX_PACKET_PAYLOAD: usize = 0xFF_FFFF;

/// MySQL 패킷 채널
pub struct PacketChannel {
    stream: TcpStream,
}

impl PacketChannel {
    /// 새 패킷 채널 생성 (TCP 연결)
    pub async fn connect(hostname: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addr = format!("{}:{}", hostname, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                ExtractorError::ConnectionError(format!("Timed out connecting to {}", addr))
            })?
            .map_err(|e| {
                ExtractorError::ConnectionError(format!("Failed to connect to {}: {}", addr, e))
            })?;

        stream.set_nodelay(true).ok();
        debug!("Connected to MySQL at {}", addr);

        Ok(PacketChannel { stream })
    }

    /// 패킷 읽기 (16MB 이상 분할 패킷은 이어 붙임)
    pub async fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let (length, _sequence) = self.read_header().await?;

            let start = payload.len();
            payload.resize(start + length, 0);
            self.stream
                .read_exact(&mut payload[start..])
                .await
                .map_err(|e| {
                    ExtractorError::IoError(format!("Failed to read packet body: {}", e))
                })?;

            if length < MAX_PACKET_PAYLOAD {
                return Ok(payload);
            }
        }
    }

    async fn read_header(&mut self) -> Result<(usize, u8)> {
        let mut header = [0u8; 4];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| ExtractorError::IoError(format!("Failed to read packet header: {}", e)))?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        Ok((length, header[3]))
    }

    /// 패킷 쓰기
    pub async fn write_packet(&mut self, data: &[u8], sequence: u8) -> Result<()> {
        if data.len() >= MAX_PACKET_PAYLOAD {
            return Err(ExtractorError::ProtocolError(format!(
                "Outgoing packet too large: {} bytes",
                data.len()
            )));
        }

        let mut frame = Vec::with_capacity(4 + data.len());
        WriteBytesExt::write_u24::<LittleEndian>(&mut frame, data.len() as u32)?;
        WriteBytesExt::write_u8(&mut frame, sequence)?;
        frame.extend_from_slice(data);

        self.stream
            .write_all(&frame)
            .await
            .map_err(|e| ExtractorError::IoError(format!("Failed to write packet: {}", e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| ExtractorError::IoError(format!("Failed to flush: {}", e)))?;

        Ok(())
    }

    /// 소켓 종료
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Greeting 패킷 파싱
#[derive(Debug, Clone)]
pub struct GreetingPacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub scramble: Vec<u8>,
    pub server_capabilities: u32,
    pub server_collation: u8,
    pub server_status: u16,
    pub auth_plugin_name: String,
}

impl GreetingPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(data);

        let protocol_version = ReadBytesExt::read_u8(&mut cursor)
            .map_err(|e| protocol_error("protocol version", e))?;

        if protocol_version == 0xFF {
            return Err(ExtractorError::ConnectionError(
                ErrPacket::parse(data)?.to_string(),
            ));
        }

        let server_version = read_null_terminated_string(&mut cursor)?;

        let thread_id = ReadBytesExt::read_u32::<LittleEndian>(&mut cursor)
            .map_err(|e| protocol_error("thread ID", e))?;

        // Auth plugin data part 1 (8 bytes)
        let mut scramble = vec![0u8; 8];
        Read::read_exact(&mut cursor, &mut scramble)
            .map_err(|e| protocol_error("scramble part 1", e))?;

        // Filler
        ReadBytesExt::read_u8(&mut cursor).map_err(|e| protocol_error("filler", e))?;

        let capabilities_lower = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)
            .map_err(|e| protocol_error("capabilities", e))?;
        let server_collation = ReadBytesExt::read_u8(&mut cursor)
            .map_err(|e| protocol_error("collation", e))?;
        let server_status = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)
            .map_err(|e| protocol_error("status", e))?;
        let capabilities_upper = ReadBytesExt::read_u16::<LittleEndian>(&mut cursor)
            .map_err(|e| protocol_error("capabilities upper", e))?;

        let server_capabilities = (capabilities_upper as u32) << 16 | capabilities_lower as u32;

        let auth_data_len = ReadBytesExt::read_u8(&mut cursor)
            .map_err(|e| protocol_error("auth data length", e))?;

        // Reserved (10 bytes)
        let mut reserved = [0u8; 10];
        Read::read_exact(&mut cursor, &mut reserved).map_err(|e| protocol_error("reserved", e))?;

        // Auth plugin data part 2 (최소 13 bytes, 마지막은 null)
        let scramble_len = std::cmp::max(13, auth_data_len.saturating_sub(8)) as usize;
        let mut scramble_part2 = vec![0u8; scramble_len];
        Read::read_exact(&mut cursor, &mut scramble_part2)
            .map_err(|e| protocol_error("scramble part 2", e))?;
        scramble.extend_from_slice(&scramble_part2[..scramble_part2.len() - 1]);

        let auth_plugin_name = if (cursor.position() as usize) < data.len() {
            read_null_terminated_string(&mut cursor).unwrap_or_default()
        } else {
            String::new()
        };

        Ok(GreetingPacket {
            protocol_version,
            server_version,
            thread_id,
            scramble,
            server_capabilities,
            server_collation,
            server_status,
            auth_plugin_name,
        })
    }
}

/// Error 패킷 (0xFF)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub sql_state: Option<String>,
    pub message: String,
}

impl ErrPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !is_error_packet(data) || data.len() < 3 {
            return Err(ExtractorError::ProtocolError(
                "Not an error packet".to_string(),
            ));
        }

        let code = u16::from_le_bytes([data[1], data[2]]);
        let rest = &data[3..];
        let (sql_state, message) = if rest.len() >= 6 && rest[0] == b'#' {
            (
                Some(String::from_utf8_lossy(&rest[1..6]).to_string()),
                &rest[6..],
            )
        } else {
            (None, rest)
        };

        Ok(ErrPacket {
            code,
            sql_state,
            message: String::from_utf8_lossy(message).to_string(),
        })
    }
}

impl std::fmt::Display for ErrPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sql_state {
            Some(state) => write!(f, "ERROR {} ({}): {}", self.code, state, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

/// 에러 패킷을 읽을 수 있는 메시지로 변환
pub fn describe_error_packet(data: &[u8]) -> String {
    ErrPacket::parse(data)
        .map(|err| err.to_string())
        .unwrap_or_else(|_| "Unknown server error".to_string())
}

fn protocol_error(field: &str, e: std::io::Error) -> ExtractorError {
    ExtractorError::ProtocolError(format!("Failed to read {}: {}", field, e))
}

/// null로 끝나는 문자열 읽기
fn read_null_terminated_string<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = ReadBytesExt::read_u8(reader).map_err(|e| protocol_error("string byte", e))?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|e| ExtractorError::ProtocolError(format!("Invalid UTF-8 in string: {}", e)))
}

/// Error 패킷 확인
pub fn is_error_packet(data: &[u8]) -> bool {
    !data.is_empty() && data[0] == 0xFF
}

/// OK 패킷 확인
pub fn is_ok_packet(data: &[u8]) -> bool {
    !data.is_empty() && data[0] == 0x00
}

/// EOF 패킷 확인 (0xFE, 9바이트 미만)
pub fn is_eof_packet(data: &[u8]) -> bool {
    !data.is_empty() && data[0] == 0xFE && data.len() < 9
}
