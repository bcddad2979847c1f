#![no_main]

use std::net::Ipv4Addr;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use sigwatch_core::types::{PacketProtocol, PacketSignature};
use sigwatch_rules::{Direction, RuleParser, matches};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 룰 텍스트 한 줄
    rule: String,
    protocol: u8,
    src: [u8; 4],
    src_port: Option<u16>,
    dst: [u8; 4],
    dst_port: Option<u16>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(parser) = RuleParser::new() else {
        return;
    };
    let Ok(parsed) = parser.parse_line(1, &input.rule) else {
        return;
    };
    let rule = parsed.into_rule("1".to_owned());

    let protocol = match input.protocol % 4 {
        0 => PacketProtocol::Ip,
        1 => PacketProtocol::Tcp,
        2 => PacketProtocol::Udp,
        _ => PacketProtocol::Icmp,
    };
    let mut sig = PacketSignature::portless(protocol, Ipv4Addr::from(input.src), Ipv4Addr::from(input.dst));
    sig.src_port = input.src_port;
    sig.dst_port = input.dst_port;

    let result = matches(&sig, &rule);

    // 양방향 룰 = 정방향 또는 뒤집은 방향
    if rule.direction == Direction::Bi {
        assert_eq!(result, matches(&sig, &rule.forward()) || matches(&sig, &rule.swapped()));
    }
});
