//! 매칭 엔진 -- 패킷 시그니처를 룰에 대해 평가합니다.
//!
//! 매칭은 할당이나 블로킹 없이 수행됩니다.
//! 양방향(`<>`) 룰은 정방향 또는 출발지/목적지를 맞바꾼 방향 중
//! 하나라도 맞으면 매칭으로 봅니다.
//!
//! 패킷 쪽 포트가 `None`(전송 계층 없음)이면 모든 포트 조건을 통과합니다.

use sigwatch_core::types::{PacketProtocol, PacketSignature};

use crate::compiler::RuleSet;
use crate::types::{Direction, IpSpec, PortMatch, PortSpec, ProtocolSpec, Rule};

/// 시그니처가 룰에 매칭되는지 확인합니다.
pub fn matches(sig: &PacketSignature, rule: &Rule) -> bool {
    match rule.direction {
        Direction::Uni => matches_oriented(sig, rule, false),
        Direction::Bi => matches_oriented(sig, rule, false) || matches_oriented(sig, rule, true),
    }
}

/// 첫 번째로 매칭되는 룰을 반환합니다. 매칭 없음은 정상 결과입니다.
pub fn first_match<'a>(sig: &PacketSignature, rule_set: &'a RuleSet) -> Option<&'a Rule> {
    rule_set.iter().find(|rule| matches(sig, rule))
}

/// `swapped`가 참이면 룰의 출발지 조건을 패킷의 목적지와, 목적지 조건을
/// 패킷의 출발지와 비교합니다. [`Rule::swapped`]와 같은 결과를 사본 없이 냅니다.
fn matches_oriented(sig: &PacketSignature, rule: &Rule, swapped: bool) -> bool {
    let (src_ip, src_port, dst_ip, dst_port) = if swapped {
        (&rule.dst_ip, &rule.dst_port, &rule.src_ip, &rule.src_port)
    } else {
        (&rule.src_ip, &rule.src_port, &rule.dst_ip, &rule.dst_port)
    };

    protocol_matches(&rule.protocol, sig.protocol)
        && ip_matches(src_ip, sig.src_ip)
        && port_matches(src_port, sig.src_port)
        && ip_matches(dst_ip, sig.dst_ip)
        && port_matches(dst_port, sig.dst_port)
}

/// 룰 프로토콜 `IP`는 TCP, UDP, IP 패킷을 포함합니다.
fn protocol_includes(rule: PacketProtocol, packet: PacketProtocol) -> bool {
    match rule {
        PacketProtocol::Ip => matches!(
            packet,
            PacketProtocol::Ip | PacketProtocol::Tcp | PacketProtocol::Udp
        ),
        other => other == packet,
    }
}

fn protocol_matches(spec: &ProtocolSpec, packet: PacketProtocol) -> bool {
    match spec {
        ProtocolSpec::Any => true,
        ProtocolSpec::Exact(p) => protocol_includes(*p, packet),
        ProtocolSpec::Negated(p) => !protocol_includes(*p, packet),
    }
}

fn ip_matches(spec: &IpSpec, ip: std::net::Ipv4Addr) -> bool {
    match spec {
        IpSpec::Any => true,
        IpSpec::Exact(want) => *want == ip,
        IpSpec::Negated(not) => *not != ip,
    }
}

fn port_match_includes(m: &PortMatch, port: u16) -> bool {
    match m {
        PortMatch::Exact(p) => *p == port,
        PortMatch::Range(lo, hi) => (*lo..=*hi).contains(&port),
    }
}

fn port_matches(spec: &PortSpec, port: Option<u16>) -> bool {
    // 패킷 쪽 "any"는 비교하지 않음
    let Some(port) = port else {
        return true;
    };
    match spec {
        PortSpec::Any => true,
        PortSpec::Exact(p) => *p == port,
        PortSpec::Range(lo, hi) => (*lo..=*hi).contains(&port),
        PortSpec::Negated(m) => !port_match_includes(m, port),
    }
}
