//! 패킷 시그니처 추출기
//!
//! 이더넷 II → IPv4 → (TCP | UDP | ICMP | 기타) 순으로 한 번만 파싱하여
//! 불변의 [`PacketSignature`]와 중복 제거용 TCP 시퀀스 정보를 함께 얻습니다.
//! 모든 함수는 순수 함수이며 패닉하지 않습니다.

use std::fmt;
use std::net::Ipv4Addr;

use pnet_packet::Packet;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;
use sigwatch_core::types::{PacketProtocol, PacketSignature};

use crate::error::ExtractionError;

/// IPv4 최소 헤더 길이 (바이트)
const IPV4_MIN_HEADER_LEN: usize = 20;

/// TCP 재전송 판별 키
///
/// 같은 키가 두 번 보이면 재전송으로 간주합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    /// 출발지 IP
    pub src_ip: Ipv4Addr,
    /// 목적지 IP
    pub dst_ip: Ipv4Addr,
    /// 출발지 포트
    pub src_port: u16,
    /// 목적지 포트
    pub dst_port: u16,
    /// 시퀀스 번호
    pub seq: u32,
    /// 확인 응답 번호
    pub ack: u32,
}

/// 한 번의 파싱 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// 패킷 시그니처
    pub signature: PacketSignature,
    /// IPv4 헤더의 상위 프로토콜 번호
    pub ip_protocol: u8,
    /// TCP 프레임의 (seq, ack)
    tcp_seq_ack: Option<(u32, u32)>,
}

impl FrameInfo {
    /// TCP 프레임이면 재전송 판별 키를 반환합니다.
    pub fn flow_key(&self) -> Option<FlowKey> {
        let (seq, ack) = self.tcp_seq_ack?;
        let sig = &self.signature;
        Some(FlowKey {
            src_ip: sig.src_ip,
            dst_ip: sig.dst_ip,
            src_port: sig.src_port?,
            dst_port: sig.dst_port?,
            seq,
            ack,
        })
    }

    /// 알림 로그에 쓰는 한 줄 요약을 반환합니다.
    pub fn summary(&self) -> FrameSummary<'_> {
        FrameSummary(self)
    }
}

/// 프레임 요약 표시 (`Ether / IP / TCP 10.0.0.1:80 > 8.8.8.8:443`)
pub struct FrameSummary<'a>(&'a FrameInfo);

impl fmt::Display for FrameSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.0;
        let sig = &info.signature;
        match (sig.protocol, sig.src_port, sig.dst_port) {
            (PacketProtocol::Tcp | PacketProtocol::Udp, Some(sport), Some(dport)) => write!(
                f,
                "Ether / IP / {} {}:{} > {}:{}",
                sig.protocol, sig.src_ip, sport, sig.dst_ip, dport
            ),
            (PacketProtocol::Icmp, ..) => {
                write!(f, "Ether / IP / ICMP {} > {}", sig.src_ip, sig.dst_ip)
            }
            _ => write!(
                f,
                "Ether / IP {} > {} proto {}",
                sig.src_ip, sig.dst_ip, info.ip_protocol
            ),
        }
    }
}

/// 프레임을 파싱합니다.
///
/// # Errors
/// - IPv4가 아닌 이더넷 타입: [`ExtractionError::NotIpv4`]
/// - 헤더가 잘린 경우: [`ExtractionError::Truncated`]
pub fn inspect(frame: &[u8]) -> Result<FrameInfo, ExtractionError> {
    let ethernet =
        EthernetPacket::new(frame).ok_or(ExtractionError::Truncated { layer: "ethernet" })?;

    let ethertype = ethernet.get_ethertype();
    if ethertype != EtherTypes::Ipv4 {
        return Err(ExtractionError::NotIpv4 {
            ethertype: ethertype.0,
        });
    }

    let ip_bytes = ethernet.payload();
    let ipv4 = Ipv4Packet::new(ip_bytes).ok_or(ExtractionError::Truncated { layer: "ipv4" })?;
    let header_len = usize::from(ipv4.get_header_length()) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || header_len > ip_bytes.len() {
        return Err(ExtractionError::Truncated { layer: "ipv4" });
    }

    let src_ip = ipv4.get_source();
    let dst_ip = ipv4.get_destination();
    let next = ipv4.get_next_level_protocol();
    let transport = &ip_bytes[header_len..];

    let (signature, tcp_seq_ack) = match next {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(transport).ok_or(ExtractionError::Truncated { layer: "tcp" })?;
            (
                PacketSignature::new(
                    PacketProtocol::Tcp,
                    (src_ip, tcp.get_source()),
                    (dst_ip, tcp.get_destination()),
                ),
                Some((tcp.get_sequence(), tcp.get_acknowledgement())),
            )
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(transport).ok_or(ExtractionError::Truncated { layer: "udp" })?;
            (
                PacketSignature::new(
                    PacketProtocol::Udp,
                    (src_ip, udp.get_source()),
                    (dst_ip, udp.get_destination()),
                ),
                None,
            )
        }
        IpNextHeaderProtocols::Icmp => (
            PacketSignature::portless(PacketProtocol::Icmp, src_ip, dst_ip),
            None,
        ),
        _ => (
            PacketSignature::portless(PacketProtocol::Ip, src_ip, dst_ip),
            None,
        ),
    };

    Ok(FrameInfo {
        signature,
        ip_protocol: next.0,
        tcp_seq_ack,
    })
}

/// 프레임에서 패킷 시그니처를 추출합니다.
pub fn extract(frame: &[u8]) -> Result<PacketSignature, ExtractionError> {
    inspect(frame).map(|info| info.signature)
}

/// TCP 프레임의 재전송 판별 키를 반환합니다. TCP가 아니거나 파싱 실패 시 `None`.
pub fn flow_key(frame: &[u8]) -> Option<FlowKey> {
    inspect(frame).ok()?.flow_key()
}

/// 테스트와 리플레이용 합성 프레임 생성기
///
/// 체크섬은 계산하지 않습니다 (추출기는 검증하지 않음).
pub mod synth {
    use std::net::Ipv4Addr;

    const ETHERTYPE_IPV4: [u8; 2] = [0x08, 0x00];

    fn ethernet_ipv4(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, transport: &[u8]) -> Vec<u8> {
        let total_len = (20 + transport.len()) as u16;
        let mut frame = Vec::with_capacity(14 + total_len as usize);
        // dst mac, src mac, ethertype
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame.extend_from_slice(&ETHERTYPE_IPV4);
        // IPv4 헤더 (IHL=5)
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]);
        frame.push(64);
        frame.push(protocol);
        frame.extend_from_slice(&[0, 0]);
        frame.extend_from_slice(&src.octets());
        frame.extend_from_slice(&dst.octets());
        frame.extend_from_slice(transport);
        frame
    }

    /// 이더넷/IPv4/TCP 프레임을 만듭니다.
    pub fn tcp_frame(
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
        seq: u32,
        ack: u32,
    ) -> Vec<u8> {
        let mut tcp = Vec::with_capacity(20);
        tcp.extend_from_slice(&src.1.to_be_bytes());
        tcp.extend_from_slice(&dst.1.to_be_bytes());
        tcp.extend_from_slice(&seq.to_be_bytes());
        tcp.extend_from_slice(&ack.to_be_bytes());
        // data offset 5, ACK 플래그
        tcp.extend_from_slice(&[0x50, 0x10]);
        tcp.extend_from_slice(&[0xff, 0xff, 0, 0, 0, 0]);
        ethernet_ipv4(6, src.0, dst.0, &tcp)
    }

    /// 이더넷/IPv4/UDP 프레임을 만듭니다.
    pub fn udp_frame(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16), payload: &[u8]) -> Vec<u8> {
        let len = (8 + payload.len()) as u16;
        let mut udp = Vec::with_capacity(len as usize);
        udp.extend_from_slice(&src.1.to_be_bytes());
        udp.extend_from_slice(&dst.1.to_be_bytes());
        udp.extend_from_slice(&len.to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(payload);
        ethernet_ipv4(17, src.0, dst.0, &udp)
    }

    /// 이더넷/IPv4/ICMP echo request 프레임을 만듭니다.
    pub fn icmp_frame(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
        ethernet_ipv4(1, src, dst, &[8, 0, 0, 0, 0, 1, 0, 1])
    }

    /// 주어진 이더넷 타입의 최소 프레임을 만듭니다.
    pub fn non_ipv4_frame(ethertype: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(&[0u8; 46]);
        frame
    }
}
