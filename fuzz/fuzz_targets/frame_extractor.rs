#![no_main]

use libfuzzer_sys::fuzz_target;
use sigwatch_sniffer::{extract, flow_key, inspect};

fuzz_target!(|data: &[u8]| {
    let inspected = inspect(data);
    let extracted = extract(data);

    // 단일 파싱 결과와 래퍼 결과가 일치해야 함
    assert_eq!(inspected.as_ref().map(|i| i.signature).ok(), extracted.ok());
    if let Ok(info) = inspected {
        assert_eq!(info.flow_key(), flow_key(data));
        let _ = info.summary().to_string();
    }
});
