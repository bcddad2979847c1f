#![no_main]

use libfuzzer_sys::fuzz_target;
use sigwatch_rules::{RuleParser, compile};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parser) = RuleParser::new() else {
        return;
    };

    for (idx, line) in text.lines().enumerate() {
        // 파싱에 성공한 룰은 렌더링 후 다시 파싱해도 같은 룰이어야 함
        if let Ok(parsed) = parser.parse_line(idx + 1, line) {
            let rule = parsed.into_rule("1".to_owned());
            let reparsed = parser
                .parse_line(1, &rule.to_string())
                .expect("rendered rule must parse");
            assert_eq!(reparsed.into_rule("1".to_owned()), rule);
        }
    }

    // 여러 줄 컴파일도 패닉 없이 Ok/Err
    let _ = compile(text.lines());
});
