//! MySQL Binlog 복제 세션
//!
//! 레플리카처럼 접속해 COM_BINLOG_DUMP로 지정한 파일의 이벤트 스트림을 받습니다.
//! 세션마다 고유한 server_id를 사용해야 서버가 기존 덤프 스레드를 끊지 않습니다.

use crate::auth::{self, AuthReply};
use crate::binlog::BinlogParser;
use crate::connection::ConnectionConfig;
use crate::error::{ExtractorError, Result};
use crate::events::{BinlogEvent, BinlogEventData, ChecksumAlgorithm};
use crate::offset::BinlogPosition;
use crate::protocol::{self, GreetingPacket, PacketChannel};
use async_trait::async_trait;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tracing::{debug, info, warn};

/// COM_QUIT 명령어 코드
const COM_QUIT: u8 = 0x01;

/// COM_QUERY 명령어 코드
const COM_QUERY: u8 = 0x03;

/// COM_BINLOG_DUMP 명령어 코드
const COM_BINLOG_DUMP: u8 = 0x12;

/// 마지막 binlog 끝에 도달하면 대기하지 않고 EOF 전송
pub const BINLOG_DUMP_NON_BLOCK: u16 = 0x01;

/// utf8mb4_general_ci
const CLIENT_COLLATION: u8 = 45;

/// 이벤트 스트림 하나
#[async_trait]
pub trait ReplicationSession: Send {
    /// 다음 이벤트. 스트림이 끝나면 `None`
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>>;

    /// 네트워크 연결과 서버 덤프 스레드 해제
    async fn close(&mut self) -> Result<()>;
}

/// 세션 생성기
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(
        &self,
        position: &BinlogPosition,
        client_id: u32,
    ) -> Result<Box<dyn ReplicationSession>>;
}

/// TCP 위에서 동작하는 Binlog 클라이언트
pub struct BinlogClient {
    channel: PacketChannel,
    checksum: ChecksumAlgorithm,
    position: BinlogPosition,
    server_id: u32,
    event_count: u64,
    closed: bool,
}

impl BinlogClient {
    /// 접속, 인증, 체크섬 협상 후 COM_BINLOG_DUMP 전송
    pub async fn connect(
        config: &ConnectionConfig,
        checksum: ChecksumAlgorithm,
        position: BinlogPosition,
        server_id: u32,
    ) -> Result<Self> {
        let mut channel =
            PacketChannel::connect(&config.hostname, config.port, config.timeout).await?;

        let handshake = async {
            Self::authenticate(&mut channel, config).await?;
            Self::negotiate_checksum(&mut channel, checksum).await?;

            let dump_command = Self::create_binlog_dump_command(
                server_id,
                &position.filename,
                position.position,
                BINLOG_DUMP_NON_BLOCK,
            )?;
            channel.write_packet(&dump_command, 0).await?;
            Ok::<(), ExtractorError>(())
        };

        tokio::time::timeout(config.timeout, handshake)
            .await
            .map_err(|_| ExtractorError::ConnectionError("Timed out during handshake".to_string()))?
            .map_err(|e| match e {
                ExtractorError::ConnectionError(_) => e,
                other => ExtractorError::ConnectionError(other.to_string()),
            })?;

        debug!(
            "Sent COM_BINLOG_DUMP: position={}, server_id={}",
            position, server_id
        );

        Ok(BinlogClient {
            channel,
            checksum,
            position,
            server_id,
            event_count: 0,
            closed: false,
        })
    }

    async fn authenticate(channel: &mut PacketChannel, config: &ConnectionConfig) -> Result<()> {
        let greeting_packet = channel.read_packet().await?;
        let greeting = GreetingPacket::parse(&greeting_packet)?;

        debug!(
            "MySQL Server version: {}, Thread ID: {}, auth plugin: {}",
            greeting.server_version, greeting.thread_id, greeting.auth_plugin_name
        );

        let (plugin, auth_response) =
            auth::scramble_for(&greeting.auth_plugin_name, &config.password, &greeting.scramble);
        let handshake = auth::create_handshake_response(
            &config.username,
            &auth_response,
            &plugin,
            CLIENT_COLLATION,
        )?;

        let mut sequence = 1u8;
        channel.write_packet(&handshake, sequence).await?;

        loop {
            let reply = channel.read_packet().await?;
            sequence = sequence.wrapping_add(1);

            match AuthReply::parse(&reply) {
                AuthReply::Ok => return Ok(()),
                AuthReply::Err(message) => {
                    return Err(ExtractorError::ConnectionError(format!(
                        "Authentication failed: {}",
                        message
                    )))
                }
                AuthReply::Switch { plugin, scramble } => {
                    debug!("Server requested auth switch to {}", plugin);
                    let (_, response) = auth::scramble_for(&plugin, &config.password, &scramble);
                    sequence = sequence.wrapping_add(1);
                    channel.write_packet(&response, sequence).await?;
                }
                AuthReply::FastAuthOk => continue,
                AuthReply::FullAuthRequired => {
                    return Err(ExtractorError::ConnectionError(
                        "caching_sha2_password full authentication requires TLS; \
                         the account has no cached credential on the server"
                            .to_string(),
                    ))
                }
                AuthReply::Unexpected(code) => {
                    return Err(ExtractorError::ConnectionError(format!(
                        "Unexpected authentication reply 0x{:02x}",
                        code
                    )))
                }
            }
        }
    }

    /// 서버 설정과 같은 체크섬을 받겠다고 알림
    async fn negotiate_checksum(
        channel: &mut PacketChannel,
        checksum: ChecksumAlgorithm,
    ) -> Result<()> {
        if checksum == ChecksumAlgorithm::Undefined {
            return Ok(());
        }

        for variable in ["@master_binlog_checksum", "@source_binlog_checksum"] {
            let query = format!("SET {} = @@global.binlog_checksum", variable);
            let mut packet = vec![COM_QUERY];
            packet.extend_from_slice(query.as_bytes());
            channel.write_packet(&packet, 0).await?;

            let result = channel.read_packet().await?;
            if protocol::is_error_packet(&result) {
                warn!(
                    "Failed to set {}: {}",
                    variable,
                    protocol::describe_error_packet(&result)
                );
            }
        }

        Ok(())
    }

    /// COM_BINLOG_DUMP 명령어 생성
    fn create_binlog_dump_command(
        server_id: u32,
        binlog_filename: &str,
        binlog_position: u64,
        flags: u16,
    ) -> Result<Vec<u8>> {
        let position = u32::try_from(binlog_position).map_err(|_| {
            ExtractorError::ProtocolError(format!(
                "Binlog position {} does not fit COM_BINLOG_DUMP",
                binlog_position
            ))
        })?;

        let mut buffer = Vec::new();

        buffer.write_u8(COM_BINLOG_DUMP)?;
        buffer.write_u32::<LittleEndian>(position)?;
        buffer.write_u16::<LittleEndian>(flags)?;
        buffer.write_u32::<LittleEndian>(server_id)?;
        buffer.write_all(binlog_filename.as_bytes())?;

        Ok(buffer)
    }
}

#[async_trait]
impl ReplicationSession for BinlogClient {
    async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        let packet = self
            .channel
            .read_packet()
            .await
            .map_err(|e| ExtractorError::StreamReadError(format!("{}: {}", self.position, e)))?;

        if protocol::is_error_packet(&packet) {
            return Err(ExtractorError::StreamReadError(format!(
                "{}: {}",
                self.position,
                protocol::describe_error_packet(&packet)
            )));
        }

        if protocol::is_eof_packet(&packet) {
            debug!("Reached end of binlog stream at {}", self.position);
            return Ok(None);
        }

        // 첫 바이트 0x00은 OK 표시, 실제 이벤트 데이터는 그 다음부터
        if packet.len() < 2 || !protocol::is_ok_packet(&packet) {
            return Err(ExtractorError::StreamReadError(format!(
                "{}: unexpected packet header 0x{:02x}",
                self.position,
                packet.first().copied().unwrap_or(0)
            )));
        }

        let event = BinlogParser::parse_event(&packet[1..], self.checksum)
            .map_err(|e| ExtractorError::StreamReadError(format!("{}: {}", self.position, e)))?;

        if let BinlogEventData::FormatDescription(ref fde) = event.data {
            if fde.checksum != ChecksumAlgorithm::Undefined {
                self.checksum = fde.checksum;
            }
        }

        self.event_count += 1;
        debug!(
            "Event #{} from {} (server_id={}): type={:?}, timestamp={}",
            self.event_count,
            self.position,
            self.server_id,
            event.header.event_type,
            event.header.timestamp
        );

        Ok(Some(event))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // 덤프 중에는 서버가 COM_QUIT를 읽지 않을 수 있으므로 소켓 종료가 실제 해제 수단
        if let Err(e) = self.channel.write_packet(&[COM_QUIT], 0).await {
            debug!("COM_QUIT failed for {}: {}", self.position, e);
        }
        if let Err(e) = self.channel.shutdown().await {
            debug!("Socket shutdown failed for {}: {}", self.position, e);
        }
        Ok(())
    }
}

/// 실제 서버로 세션을 여는 커넥터
#[derive(Debug, Clone)]
pub struct TcpSessionConnector {
    config: ConnectionConfig,
    checksum: ChecksumAlgorithm,
}

impl TcpSessionConnector {
    pub fn new(config: ConnectionConfig, checksum: ChecksumAlgorithm) -> Self {
        TcpSessionConnector { config, checksum }
    }
}

#[async_trait]
impl SessionConnector for TcpSessionConnector {
    async fn open(
        &self,
        position: &BinlogPosition,
        client_id: u32,
    ) -> Result<Box<dyn ReplicationSession>> {
        info!(
            "Opening replication session for {} as server_id {}",
            position, client_id
        );
        let client =
            BinlogClient::connect(&self.config, self.checksum, position.clone(), client_id)
                .await?;
        Ok(Box::new(client))
    }
}
