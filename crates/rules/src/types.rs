//! 룰 데이터 구조
//!
//! 룰 쪽 값은 와일드카드(`Any`)와 부정(`Negated`)을 담을 수 있다는 점에서
//! 항상 구체적인 [`PacketSignature`]와 구분됩니다.
//! 모든 타입은 `Display`로 룰 문법 텍스트를 다시 만들어냅니다.

use std::fmt;
use std::net::Ipv4Addr;

use sigwatch_core::types::{PacketProtocol, PacketSignature};

/// 룰의 프로토콜 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolSpec {
    /// 모든 프로토콜
    Any,
    /// 해당 프로토콜 (IP는 TCP/UDP/IP 패킷을 포함)
    Exact(PacketProtocol),
    /// 해당 프로토콜이 아님
    Negated(PacketProtocol),
}

/// 룰의 IP 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpSpec {
    /// 모든 주소
    Any,
    /// 정확히 일치
    Exact(Ipv4Addr),
    /// 해당 주소가 아님
    Negated(Ipv4Addr),
}

/// 부정 가능한 포트 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMatch {
    /// 단일 포트
    Exact(u16),
    /// 닫힌 구간 `[lo, hi]`
    Range(u16, u16),
}

/// 룰의 포트 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSpec {
    /// 모든 포트
    Any,
    /// 단일 포트
    Exact(u16),
    /// 닫힌 구간 `[lo, hi]`
    Range(u16, u16),
    /// 내부 조건의 부정
    Negated(PortMatch),
}

/// 룰 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `->` 출발지에서 목적지로
    Uni,
    /// `<>` 양방향
    Bi,
}

/// 페이로드 조건. 내용 검사는 지원하지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PayloadSpec {
    /// 임의의 페이로드
    #[default]
    Wildcard,
}

/// 컴파일된 시그니처 룰
///
/// 컴파일 이후 불변입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// 룰 ID (로드된 집합 안에서 유일)
    pub id: String,
    /// 프로토콜 조건
    pub protocol: ProtocolSpec,
    /// 출발지 IP 조건
    pub src_ip: IpSpec,
    /// 출발지 포트 조건
    pub src_port: PortSpec,
    /// 방향
    pub direction: Direction,
    /// 목적지 IP 조건
    pub dst_ip: IpSpec,
    /// 목적지 포트 조건
    pub dst_port: PortSpec,
    /// 페이로드 조건
    pub payload: PayloadSpec,
    /// 알림 메시지 (`ruleID <id>`)
    pub message: String,
}

impl Rule {
    /// 알림 메시지를 ID로부터 만듭니다.
    pub fn message_for(id: &str) -> String {
        format!("ruleID {id}")
    }

    /// 방향을 `Uni`로 고정한 사본을 반환합니다.
    pub fn forward(&self) -> Rule {
        Rule {
            direction: Direction::Uni,
            ..self.clone()
        }
    }

    /// 출발지/목적지를 맞바꾸고 방향을 `Uni`로 고정한 사본을 반환합니다.
    pub fn swapped(&self) -> Rule {
        Rule {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
            direction: Direction::Uni,
            ..self.clone()
        }
    }

    /// 패킷 시그니처와 정확히 일치하는 단방향 룰을 만듭니다.
    ///
    /// 전송 계층 포트가 없는 시그니처는 포트가 `any`가 됩니다.
    pub fn from_signature(id: impl Into<String>, sig: &PacketSignature) -> Rule {
        let id = id.into();
        let port = |p: Option<u16>| p.map_or(PortSpec::Any, PortSpec::Exact);
        Rule {
            message: Rule::message_for(&id),
            id,
            protocol: ProtocolSpec::Exact(sig.protocol),
            src_ip: IpSpec::Exact(sig.src_ip),
            src_port: port(sig.src_port),
            direction: Direction::Uni,
            dst_ip: IpSpec::Exact(sig.dst_ip),
            dst_port: port(sig.dst_port),
            payload: PayloadSpec::Wildcard,
        }
    }

    /// ID 없이 룰 본문만 렌더링합니다.
    pub fn body(&self) -> String {
        format!(
            "{} {}:{} {} {}:{} {}",
            self.protocol,
            self.src_ip,
            self.src_port,
            self.direction,
            self.dst_ip,
            self.dst_port,
            self.payload
        )
    }
}

/// 시그니처에 대한 ID 없는 룰 텍스트를 만듭니다.
///
/// 룰 파일에 그대로 추가할 수 있으며, 로드 시 ID가 자동 부여됩니다.
pub fn render_rule(sig: &PacketSignature) -> String {
    Rule::from_signature("0", sig).body()
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.body())
    }
}

impl fmt::Display for ProtocolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Exact(p) => write!(f, "{p}"),
            Self::Negated(p) => write!(f, "!{p}"),
        }
    }
}

impl fmt::Display for IpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Exact(ip) => write!(f, "{ip}"),
            Self::Negated(ip) => write!(f, "!{ip}"),
        }
    }
}

impl fmt::Display for PortMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "{p}"),
            Self::Range(lo, hi) => write!(f, "[{lo}-{hi}]"),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Exact(p) => write!(f, "{p}"),
            Self::Range(lo, hi) => write!(f, "[{lo}-{hi}]"),
            Self::Negated(m) => write!(f, "!{m}"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uni => write!(f, "->"),
            Self::Bi => write!(f, "<>"),
        }
    }
}

impl fmt::Display for PayloadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "(*)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_sig() -> PacketSignature {
        PacketSignature::new(
            PacketProtocol::Tcp,
            (Ipv4Addr::new(10, 0, 0, 1), 80),
            (Ipv4Addr::new(8, 8, 8, 8), 443),
        )
    }

    #[test]
    fn swapped_exchanges_endpoints() {
        let rule = Rule {
            direction: Direction::Bi,
            src_port: PortSpec::Range(1000, 2000),
            ..Rule::from_signature("1", &tcp_sig())
        };
        let swapped = rule.swapped();
        assert_eq!(swapped.src_ip, rule.dst_ip);
        assert_eq!(swapped.dst_port, PortSpec::Range(1000, 2000));
        assert_eq!(swapped.direction, Direction::Uni);
        assert_eq!(rule.forward().direction, Direction::Uni);
    }

    #[test]
    fn from_signature_is_exact() {
        let rule = Rule::from_signature("42", &tcp_sig());
        assert_eq!(rule.to_string(), "42: TCP 10.0.0.1:80 -> 8.8.8.8:443 (*)");
        assert_eq!(rule.message, "ruleID 42");
    }

    #[test]
    fn render_rule_for_portless_signature() {
        let sig = PacketSignature::portless(
            PacketProtocol::Icmp,
            Ipv4Addr::new(192, 168, 2, 12),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        assert_eq!(
            render_rule(&sig),
            "ICMP 192.168.2.12:any -> 10.0.0.1:any (*)"
        );
    }

    #[test]
    fn negated_specs_display_with_bang() {
        assert_eq!(PortSpec::Negated(PortMatch::Range(1, 1023)).to_string(), "![1-1023]");
        assert_eq!(IpSpec::Negated(Ipv4Addr::LOCALHOST).to_string(), "!127.0.0.1");
        assert_eq!(ProtocolSpec::Negated(PacketProtocol::Ip).to_string(), "!IP");
    }
}
