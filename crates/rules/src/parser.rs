//! 룰 문법 파서
//!
//! 한 줄의 룰 텍스트를 앵커된 정규식으로 분해한 뒤,
//! 각 필드를 타입이 있는 조건([`IpSpec`], [`PortSpec`] 등)으로 변환합니다.
//!
//! # 문법
//! ```text
//! rule     := [id ":" ws] protocol ws endpoint ws direction ws endpoint ws payload
//! id       := 1*5 DIGIT
//! protocol := "!"? ("IP" | "TCP" | "UDP" | "ICMP" | "any")
//! endpoint := ip ":" port
//! ip       := "!"? (dotted-quad | "any")
//! port     := "!"? (1*5 DIGIT | "any" | "[" "!"? DIGIT+ "-" DIGIT+ "]")
//! direction:= "->" | "<>"
//! payload  := "*" | "(*)"
//! ```
//!
//! 정규식이 받아들여도 의미상 잘못된 값(옥텟 > 255, 포트 > 65535,
//! `lo > hi` 구간, `!any`)은 파싱 에러로 취급합니다.
//!
//! 구간의 부정은 `![lo-hi]`와 `[!lo-hi]` 두 가지로 쓸 수 있으며 같은 조건이 됩니다.
//! 둘을 겹친 `![!lo-hi]`는 에러입니다.

use std::net::Ipv4Addr;

use regex::{Captures, Regex};
use sigwatch_core::types::PacketProtocol;

use crate::error::RuleError;
use crate::types::{Direction, IpSpec, PayloadSpec, PortMatch, PortSpec, ProtocolSpec, Rule};

const RULE_PATTERN: &str = r"(?x)
    ^
    (?:(?P<id>\d{1,5}):\s+)?
    (?P<proto>!?(?:IP|TCP|UDP|ICMP|any))
    \s+
    (?P<src_ip>!?(?:\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|any))
    :
    (?P<src_port>!?(?:\d{1,5}|any|\[!?\d+-\d+\]))
    \s+
    (?P<dir>->|<>)
    \s+
    (?P<dst_ip>!?(?:\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|any))
    :
    (?P<dst_port>!?(?:\d{1,5}|any|\[!?\d+-\d+\]))
    \s+
    (?P<payload>\*|\(\*\))
    $
";

/// 파싱된 룰 한 줄
///
/// ID가 생략된 경우 컴파일러가 자동 부여합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    /// 명시된 ID (정규화된 10진수 문자열)
    pub id: Option<String>,
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
}

impl ParsedRule {
    /// 최종 ID를 붙여 [`Rule`]로 변환합니다.
    pub fn into_rule(self, id: String) -> Rule {
        Rule {
            message: Rule::message_for(&id),
            id,
            protocol: self.protocol,
            src_ip: self.src_ip,
            src_port: self.src_port,
            direction: self.direction,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
            payload: self.payload,
        }
    }
}

/// 룰 파서
///
/// 문법 정규식을 한 번 컴파일해 두고 여러 줄에 재사용합니다.
pub struct RuleParser {
    pattern: Regex,
}

impl RuleParser {
    /// 문법 정규식을 컴파일하여 파서를 생성합니다.
    pub fn new() -> Result<Self, RuleError> {
        Ok(Self {
            pattern: Regex::new(RULE_PATTERN)?,
        })
    }

    /// 한 줄을 파싱합니다. `line_no`는 에러 보고용 1-based 줄 번호입니다.
    pub fn parse_line(&self, line_no: usize, text: &str) -> Result<ParsedRule, RuleError> {
        let fail = |reason: String| RuleError::Parse {
            line: line_no,
            reason,
        };

        let caps = self
            .pattern
            .captures(text.trim())
            .ok_or_else(|| fail("does not match the rule syntax".to_owned()))?;

        let field = |name: &str| caps.name(name).map_or("", |m| m.as_str());

        let id = caps
            .name("id")
            .map(|m| parse_id(m.as_str()))
            .transpose()
            .map_err(fail)?;

        Ok(ParsedRule {
            id,
            protocol: parse_protocol(field("proto")).map_err(fail)?,
            src_ip: parse_ip(field("src_ip")).map_err(fail)?,
            src_port: parse_port(field("src_port")).map_err(fail)?,
            direction: parse_direction(&caps),
            dst_ip: parse_ip(field("dst_ip")).map_err(fail)?,
            dst_port: parse_port(field("dst_port")).map_err(fail)?,
            payload: PayloadSpec::Wildcard,
        })
    }
}

fn parse_id(raw: &str) -> Result<String, String> {
    // "007"과 "7"은 같은 ID로 취급
    raw.parse::<u32>()
        .map(|n| n.to_string())
        .map_err(|e| format!("invalid rule id '{raw}': {e}"))
}

fn parse_direction(caps: &Captures<'_>) -> Direction {
    match caps.name("dir").map(|m| m.as_str()) {
        Some("<>") => Direction::Bi,
        _ => Direction::Uni,
    }
}

/// 앞의 `!`를 떼어내고 부정 여부를 함께 반환합니다.
fn split_negation(raw: &str) -> (bool, &str) {
    match raw.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw),
    }
}

fn parse_protocol(raw: &str) -> Result<ProtocolSpec, String> {
    let (negated, name) = split_negation(raw);
    let protocol = match name {
        "any" if negated => return Err("'!any' is not a valid protocol".to_owned()),
        "any" => return Ok(ProtocolSpec::Any),
        "IP" => PacketProtocol::Ip,
        "TCP" => PacketProtocol::Tcp,
        "UDP" => PacketProtocol::Udp,
        "ICMP" => PacketProtocol::Icmp,
        other => return Err(format!("unknown protocol '{other}'")),
    };
    Ok(if negated {
        ProtocolSpec::Negated(protocol)
    } else {
        ProtocolSpec::Exact(protocol)
    })
}

fn parse_ip(raw: &str) -> Result<IpSpec, String> {
    let (negated, addr) = split_negation(raw);
    if addr == "any" {
        return if negated {
            Err("'!any' is not a valid address".to_owned())
        } else {
            Ok(IpSpec::Any)
        };
    }

    let ip = addr
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("invalid IPv4 address '{addr}'"))?;
    Ok(if negated {
        IpSpec::Negated(ip)
    } else {
        IpSpec::Exact(ip)
    })
}

fn parse_port_number(raw: &str) -> Result<u16, String> {
    raw.parse::<u16>()
        .map_err(|_| format!("port '{raw}' out of range (0-65535)"))
}

fn parse_port(raw: &str) -> Result<PortSpec, String> {
    let (mut negated, body) = split_negation(raw);
    if body == "any" {
        return if negated {
            Err("'!any' is not a valid port".to_owned())
        } else {
            Ok(PortSpec::Any)
        };
    }

    let port_match = match body
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        Some(range) => {
            let (inner_negated, range) = split_negation(range);
            if inner_negated && negated {
                return Err(format!("port range '{raw}' is negated twice"));
            }
            negated |= inner_negated;
            let (lo, hi) = range
                .split_once('-')
                .ok_or_else(|| format!("malformed port range '{body}'"))?;
            let lo = parse_port_number(lo)?;
            let hi = parse_port_number(hi)?;
            if lo > hi {
                return Err(format!("port range [{lo}-{hi}] has lo > hi"));
            }
            PortMatch::Range(lo, hi)
        }
        None => PortMatch::Exact(parse_port_number(body)?),
    };

    Ok(match (negated, port_match) {
        (true, m) => PortSpec::Negated(m),
        (false, PortMatch::Exact(p)) => PortSpec::Exact(p),
        (false, PortMatch::Range(lo, hi)) => PortSpec::Range(lo, hi),
    })
}
