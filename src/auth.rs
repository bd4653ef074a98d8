//! MySQL 인증 처리
//!
//! mysql_native_password 및 caching_sha2_password(fast auth) 구현

use crate::protocol;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

pub const NATIVE_PASSWORD: &str = "mysql_native_password";
pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// Client capability flags
pub mod capabilities {
    pub const LONG_PASSWORD: u32 = 1;
    pub const LONG_FLAG: u32 = 4;
    pub const PROTOCOL_41: u32 = 512;
    pub const TRANSACTIONS: u32 = 8192;
    pub const SECURE_CONNECTION: u32 = 32768;
    pub const MULTI_RESULTS: u32 = 1 << 17;
    pub const PLUGIN_AUTH: u32 = 1 << 19;
}

/// Native password 인증 응답 생성
pub fn create_auth_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    use sha1::{Digest, Sha1};

    // SHA1(password)
    let stage1 = Sha1::digest(password.as_bytes());

    // SHA1(SHA1(password))
    let stage2 = Sha1::digest(stage1);

    // SHA1(scramble + SHA1(SHA1(password)))
    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let stage3 = hasher.finalize();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// caching_sha2_password 응답 생성
///
/// XOR(SHA256(password), SHA256(SHA256(SHA256(password)) + scramble))
pub fn create_sha2_auth_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    use sha2::{Digest, Sha256};

    let stage1 = Sha256::digest(password.as_bytes());
    let stage2 = Sha256::digest(stage1);

    let mut hasher = Sha256::new();
    hasher.update(stage2);
    hasher.update(scramble);
    let stage3 = hasher.finalize();

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

/// 플러그인 이름에 맞는 스크램블 계산. 모르는 플러그인은 native로 처리
pub fn scramble_for(plugin: &str, password: &str, scramble: &[u8]) -> (String, Vec<u8>) {
    match plugin {
        CACHING_SHA2_PASSWORD => (
            CACHING_SHA2_PASSWORD.to_string(),
            create_sha2_auth_response(password, scramble),
        ),
        _ => (
            NATIVE_PASSWORD.to_string(),
            create_auth_response(password, scramble),
        ),
    }
}

/// 인증 패킷 생성
pub fn create_handshake_response(
    username: &str,
    auth_response: &[u8],
    plugin: &str,
    collation: u8,
) -> Result<Vec<u8>, std::io::Error> {
    let mut buffer = Vec::new();

    let capabilities = capabilities::LONG_PASSWORD
        | capabilities::LONG_FLAG
        | capabilities::PROTOCOL_41
        | capabilities::TRANSACTIONS
        | capabilities::SECURE_CONNECTION
        | capabilities::MULTI_RESULTS
        | capabilities::PLUGIN_AUTH;

    buffer.write_u32::<LittleEndian>(capabilities)?;

    // Max packet size (4 bytes) - 0 means default (16MB)
    buffer.write_u32::<LittleEndian>(0)?;

    buffer.write_u8(collation)?;

    // Reserved (23 bytes of zeros)
    buffer.write_all(&[0u8; 23])?;

    buffer.write_all(username.as_bytes())?;
    buffer.write_u8(0)?;

    buffer.write_u8(auth_response.len() as u8)?;
    buffer.write_all(auth_response)?;

    buffer.write_all(plugin.as_bytes())?;
    buffer.write_u8(0)?;

    Ok(buffer)
}

/// 핸드셰이크 응답 이후 서버가 보내는 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Ok,
    Err(String),
    /// 0xFE: 다른 플러그인으로 다시 인증
    Switch { plugin: String, scramble: Vec<u8> },
    /// 0x01 0x03: caching_sha2 캐시 적중, 곧 OK가 옴
    FastAuthOk,
    /// 0x01 0x04: 평문/RSA 전체 인증 필요
    FullAuthRequired,
    Unexpected(u8),
}

impl AuthReply {
    pub fn parse(packet: &[u8]) -> AuthReply {
        match packet.first() {
            Some(0x00) => AuthReply::Ok,
            Some(0xFF) => AuthReply::Err(protocol::describe_error_packet(packet)),
            Some(0xFE) => {
                let body = &packet[1..];
                let name_end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
                let plugin = String::from_utf8_lossy(&body[..name_end]).to_string();
                let mut scramble = body.get(name_end + 1..).unwrap_or_default().to_vec();
                if scramble.last() == Some(&0) {
                    scramble.pop();
                }
                AuthReply::Switch { plugin, scramble }
            }
            Some(0x01) => match packet.get(1) {
                Some(0x03) => AuthReply::FastAuthOk,
                Some(0x04) => AuthReply::FullAuthRequired,
                _ => AuthReply::Unexpected(0x01),
            },
            Some(other) => AuthReply::Unexpected(*other),
            None => AuthReply::Unexpected(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_auth_response_empty_password() {
        let response = create_auth_response("", &[1, 2, 3, 4]);
        assert!(response.is_empty());
        assert!(create_sha2_auth_response("", &[1, 2, 3, 4]).is_empty());
    }

    #[test]
    fn test_create_auth_response() {
        let scramble = vec![0x40, 0x3B, 0x57, 0x68, 0x3A, 0x77, 0x23, 0x29];
        let response = create_auth_response("password", &scramble);
        assert_eq!(response.len(), 20); // SHA1 produces 20 bytes
    }

    #[test]
    fn test_create_sha2_auth_response() {
        let scramble = [7u8; 20];
        let response = create_sha2_auth_response("password", &scramble);
        assert_eq!(response.len(), 32);
        assert_ne!(response, create_sha2_auth_response("password", &[8u8; 20]));
    }

    #[test]
    fn test_scramble_for_unknown_plugin_falls_back_to_native() {
        let (plugin, response) = scramble_for("sha256_password", "pw", &[1u8; 20]);
        assert_eq!(plugin, NATIVE_PASSWORD);
        assert_eq!(response.len(), 20);
    }

    #[test]
    fn test_create_handshake_response() {
        let scramble = vec![0x40, 0x3B, 0x57, 0x68, 0x3A, 0x77, 0x23, 0x29];
        let auth = create_auth_response("password", &scramble);
        let packet = create_handshake_response("root", &auth, NATIVE_PASSWORD, 33).unwrap();

        // capabilities(4) + max packet(4) + charset(1) + reserved(23) + "root\0" + len + auth + plugin
        assert_eq!(packet.len(), 32 + 5 + 1 + 20 + NATIVE_PASSWORD.len() + 1);
        assert!(packet.ends_with(b"mysql_native_password\0"));

        let flags = u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]);
        assert_ne!(flags & capabilities::PLUGIN_AUTH, 0);
        // 기본 데이터베이스 없이 접속
        assert_eq!(flags & 8, 0);
    }

    #[test]
    fn test_auth_reply_switch() {
        let mut packet = vec![0xFE];
        packet.extend_from_slice(b"mysql_native_password\0");
        packet.extend_from_slice(&[9u8; 20]);
        packet.push(0);

        assert_eq!(
            AuthReply::parse(&packet),
            AuthReply::Switch {
                plugin: NATIVE_PASSWORD.to_string(),
                scramble: vec![9u8; 20],
            }
        );
    }

    #[test]
    fn test_auth_reply_more_data() {
        assert_eq!(AuthReply::parse(&[0x01, 0x03]), AuthReply::FastAuthOk);
        assert_eq!(AuthReply::parse(&[0x01, 0x04]), AuthReply::FullAuthRequired);
        assert_eq!(AuthReply::parse(&[0x00, 0x00, 0x00]), AuthReply::Ok);
    }
}
