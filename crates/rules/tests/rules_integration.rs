//! 룰 엔진 통합 테스트
//!
//! - 저장소의 기본 룰 파일 로딩
//! - 파일 기반 컴파일 → 매칭 → 리로드 흐름
//! - 리로드 중 동시 매칭이 찢어진 집합을 보지 않는지 확인

use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sigwatch_core::types::{PacketProtocol, PacketSignature};
use sigwatch_rules::{ReloadHandle, RuleError, RuleStore, compile_file, first_match};

fn write_rules(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for line in lines {
        writeln!(file, "{line}").expect("write rule");
    }
    file
}

fn sig(protocol: PacketProtocol, src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16) -> PacketSignature {
    PacketSignature::new(protocol, (Ipv4Addr::from(src), sport), (Ipv4Addr::from(dst), dport))
}

#[tokio::test]
async fn bundled_default_rules_compile_cleanly() {
    let path = format!("{}/../../rules/default.rules", env!("CARGO_MANIFEST_DIR"));
    let set = compile_file(&path).await.expect("default rules should compile");

    assert!(!set.is_empty());
    assert_eq!(set.load_error_count(), 0);

    // telnet 룰
    let telnet = sig(PacketProtocol::Tcp, [10, 0, 0, 5], 40000, [10, 0, 0, 1], 23);
    assert_eq!(first_match(&telnet, &set).map(|r| r.id.as_str()), Some("1"));

    // IRC 구간 룰은 양방향
    let irc_reply = sig(PacketProtocol::Tcp, [10, 0, 0, 1], 6667, [10, 0, 0, 5], 40000);
    assert_eq!(first_match(&irc_reply, &set).map(|r| r.id.as_str()), Some("2"));
}

#[tokio::test]
async fn documented_examples_match() {
    let file = write_rules(&[
        "1: TCP 10.0.0.1:80 -> any:any (*)",
        "2: TCP any:[1000-2000] -> any:any (*)",
        "3: UDP any:any -> !192.168.1.1:any (*)",
    ]);
    let set = compile_file(file.path()).await.expect("compile");

    let hit = first_match(&sig(PacketProtocol::Tcp, [10, 0, 0, 1], 80, [8, 8, 8, 8], 443), &set);
    assert_eq!(hit.map(|r| r.message.as_str()), Some("ruleID 1"));

    let hit = first_match(&sig(PacketProtocol::Tcp, [1, 2, 3, 4], 1500, [8, 8, 8, 8], 443), &set);
    assert_eq!(hit.map(|r| r.id.as_str()), Some("2"));
    assert!(first_match(&sig(PacketProtocol::Tcp, [1, 2, 3, 4], 2500, [8, 8, 8, 8], 443), &set).is_none());

    assert!(first_match(&sig(PacketProtocol::Udp, [1, 2, 3, 4], 1, [192, 168, 1, 1], 53), &set).is_none());
    let hit = first_match(&sig(PacketProtocol::Udp, [1, 2, 3, 4], 1, [10, 0, 0, 9], 53), &set);
    assert_eq!(hit.map(|r| r.id.as_str()), Some("3"));
}

#[tokio::test]
async fn duplicate_id_reload_leaves_store_untouched() {
    let file = write_rules(&["1: TCP any:any -> any:23 (*)", "2: TCP any:any -> any:21 (*)"]);
    let store = RuleStore::open(file.path()).await.expect("open");
    let handle = ReloadHandle::new(Arc::new(store), file.path());

    std::fs::write(
        file.path(),
        "5: TCP any:any -> any:80 (*)\n5: TCP any:any -> any:81 (*)\n",
    )
    .expect("rewrite");

    let err = handle.reload().await.expect_err("reload must fail");
    assert!(matches!(err, RuleError::DuplicateId { ref id, .. } if id == "5"));

    let active = handle.snapshot();
    let ids: Vec<&str> = active.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn oversized_rule_file_is_rejected() {
    let file = tempfile::NamedTempFile::new().expect("temp file");
    file.as_file()
        .set_len(sigwatch_rules::MAX_RULE_FILE_SIZE + 1)
        .expect("grow file");

    let err = compile_file(file.path()).await.expect_err("must reject");
    assert!(err.to_string().contains("file too large"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_during_reload_sees_old_or_new_set() {
    let old_lines = ["1: TCP any:any -> any:22 (*)"];
    let file = write_rules(&old_lines);
    let store = Arc::new(RuleStore::open(file.path()).await.expect("open"));

    let probe = sig(PacketProtocol::Tcp, [10, 0, 0, 2], 40000, [10, 0, 0, 1], 22);
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                let snapshot = store.snapshot();
                // 이전 집합(1개) 또는 새 집합(3개)만 관찰 가능
                assert!(snapshot.len() == 1 || snapshot.len() == 3);
                let hit = first_match(&probe, &snapshot).map(|r| r.id.clone());
                match snapshot.len() {
                    1 => assert_eq!(hit.as_deref(), Some("1")),
                    _ => assert_eq!(hit.as_deref(), Some("10")),
                }
            }
        })
    };

    let new_content = "10: TCP any:any -> any:22 (*)\n11: TCP any:any -> any:23 (*)\n12: UDP any:any -> any:53 (*)\n";
    let old_content = "1: TCP any:any -> any:22 (*)\n";
    for i in 0..20 {
        let content = if i % 2 == 0 { new_content } else { old_content };
        std::fs::write(file.path(), content).expect("rewrite");
        store.reload(file.path()).await.expect("reload");
    }

    done.store(true, Ordering::Release);
    reader.join().expect("reader thread");
}
