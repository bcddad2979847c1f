//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 캡처 스레드, 매칭 엔진, 펀널이 공유하는 데이터 구조를 정의합니다.
//! 패킷 쪽 값([`PacketSignature`])은 항상 구체적이며 와일드카드나 부정을 담지 않습니다.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 패킷 프로토콜
///
/// IPv4 헤더 다음 계층을 기준으로 분류합니다.
/// TCP/UDP/ICMP가 아닌 IP 패킷은 [`PacketProtocol::Ip`]로 분류됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketProtocol {
    /// 전송 계층을 해석하지 않은 IP 패킷
    Ip,
    /// TCP
    Tcp,
    /// UDP
    Udp,
    /// ICMP
    Icmp,
}

impl fmt::Display for PacketProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "IP"),
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmp => write!(f, "ICMP"),
        }
    }
}

/// 페이로드 표식
///
/// 페이로드 내용 검사는 지원하지 않으므로 항상 와일드카드입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadMarker {
    /// 임의의 페이로드
    #[default]
    Wildcard,
}

/// 패킷 시그니처
///
/// 캡처된 프레임에서 한 번 추출되는 불변 값입니다.
/// 전송 계층 헤더가 없는 프레임(ICMP 등)은 포트가 `None`이며,
/// 이는 룰 매칭에서 "any"로 취급됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketSignature {
    /// 프로토콜
    pub protocol: PacketProtocol,
    /// 출발지 IP
    pub src_ip: Ipv4Addr,
    /// 출발지 포트 (전송 계층이 없으면 `None`)
    pub src_port: Option<u16>,
    /// 목적지 IP
    pub dst_ip: Ipv4Addr,
    /// 목적지 포트 (전송 계층이 없으면 `None`)
    pub dst_port: Option<u16>,
    /// 페이로드 표식
    pub payload: PayloadMarker,
}

impl PacketSignature {
    /// 포트가 있는 시그니처를 생성합니다.
    pub fn new(
        protocol: PacketProtocol,
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
    ) -> Self {
        Self {
            protocol,
            src_ip: src.0,
            src_port: Some(src.1),
            dst_ip: dst.0,
            dst_port: Some(dst.1),
            payload: PayloadMarker::Wildcard,
        }
    }

    /// 포트가 없는 시그니처를 생성합니다 (ICMP 등).
    pub fn portless(protocol: PacketProtocol, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Self {
        Self {
            protocol,
            src_ip,
            src_port: None,
            dst_ip,
            dst_port: None,
            payload: PayloadMarker::Wildcard,
        }
    }
}

impl fmt::Display for PacketSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = |p: Option<u16>| p.map_or_else(|| "any".to_owned(), |p| p.to_string());
        write!(
            f,
            "{} {}:{} -> {}:{} *",
            self.protocol,
            self.src_ip,
            port(self.src_port),
            self.dst_ip,
            port(self.dst_port),
        )
    }
}

/// 캡처된 원시 프레임
///
/// 링크 계층부터 시작하는 바이트열과 캡처 시각을 담습니다.
/// `Bytes`를 사용하므로 복제 비용이 낮습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// 이더넷 프레임 바이트
    pub data: Bytes,
    /// 캡처 시각
    pub captured_at: SystemTime,
}

impl RawFrame {
    /// 현재 시각으로 프레임을 생성합니다.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            captured_at: SystemTime::now(),
        }
    }

    /// 프레임 길이(바이트)를 반환합니다.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 빈 프레임인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 펀널 대기 집합
///
/// 스니퍼(생산자)와 라우터(소비자)가 공유하는 유일한 가변 상태입니다.
/// 단일 뮤텍스로 보호되며, 소비는 항상 "드레인 후 비우기" 방식입니다.
/// 잠금을 잡지 않은 채 내부를 순회하는 API는 제공하지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<Mutex<Vec<RawFrame>>>,
}

impl PendingSet {
    /// 빈 대기 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 프레임을 추가합니다.
    pub fn push(&self, frame: RawFrame) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }

    /// 전체 내용을 꺼내고 집합을 비웁니다.
    ///
    /// 반환된 Vec은 호출자 소유의 사본이므로 잠금 밖에서 처리합니다.
    pub fn drain(&self) -> Vec<RawFrame> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// 현재 대기 중인 프레임 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
