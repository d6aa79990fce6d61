use pcap_forensics::config::ScanConfig;
use pcap_forensics::error::ScanError;
use pcap_forensics::scan::*;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RULES: &str = r#"
rule alpha {
    meta: family = "greek"
    strings: $a = "alpha"
    condition: $a
}
rule beta {
    strings: $b = "beta" nocase
    condition: $b
}
"#;

/// Answers scans in batches of `batch`, last request first
struct ReversingHost {
    batch: usize,
}

impl UnitHost for ReversingHost {
    fn launch(self, port: UnitPort) -> io::Result<()> {
        thread::Builder::new()
            .name("reversing-unit".to_owned())
            .spawn(move || {
                let mut worker = RuleWorker::default();
                let mut held = Vec::new();
                for raw in port.requests.iter() {
                    let request: Request = serde_json::from_str(&raw).expect("valid request");
                    let is_scan = matches!(request, Request::Scan { .. });
                    let reply = serde_json::to_string(&worker.handle(request)).expect("encode");
                    if !is_scan {
                        let _ = port.responses.send(reply);
                        continue;
                    }
                    held.push(reply);
                    if held.len() == self.batch {
                        for reply in held.drain(..).rev() {
                            let _ = port.responses.send(reply);
                        }
                    }
                }
            })?;
        Ok(())
    }
}

/// Reads requests and never answers
struct SilentHost;

impl UnitHost for SilentHost {
    fn launch(self, port: UnitPort) -> io::Result<()> {
        thread::spawn(move || {
            let UnitPort {
                requests,
                responses,
            } = port;
            for _ in requests.iter() {}
            drop(responses);
        });
        Ok(())
    }
}

/// Exits after reading its first request
struct CrashingHost;

impl UnitHost for CrashingHost {
    fn launch(self, port: UnitPort) -> io::Result<()> {
        thread::spawn(move || {
            let UnitPort {
                requests,
                responses,
            } = port;
            let _ = requests.recv();
            drop(responses);
        });
        Ok(())
    }
}

/// Precedes every answer with a response for an id nobody asked for
struct StaleHost;

impl UnitHost for StaleHost {
    fn launch(self, port: UnitPort) -> io::Result<()> {
        thread::spawn(move || {
            let mut worker = RuleWorker::default();
            for raw in port.requests.iter() {
                let stale = Response::scanned(u64::MAX, Vec::new());
                let _ = port.responses.send(serde_json::to_string(&stale).expect("encode"));
                if let Some(reply) = worker.handle_message(&raw) {
                    let _ = port.responses.send(reply);
                }
            }
        });
        Ok(())
    }
}

struct NoIsolationHost;

impl UnitHost for NoIsolationHost {
    fn launch(self, _port: UnitPort) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "isolation unsupported"))
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

fn rule_names(outcome: &ScanOutcome) -> Vec<&str> {
    outcome.matches.iter().map(|m| m.rule.as_str()).collect()
}

#[tokio::test]
async fn test_compile_and_scan() {
    let engine = ScanEngine::new(&ScanConfig::default());
    assert_eq!(engine.state(), EngineState::Ready);
    let compiled = engine.compile_rules(&[RULES]).await.expect("compile");
    assert_eq!(compiled.rule_count, 2);

    let outcome = engine.scan_payload(b"xx alpha BETA").await.expect("scan");
    assert_eq!(rule_names(&outcome), vec!["alpha", "beta"]);
    let alpha = &outcome.matches[0];
    assert_eq!(alpha.meta.get("family").map(String::as_str), Some("greek"));
    assert_eq!(
        alpha.matches,
        vec![StringMatch {
            identifier: "$a".to_owned(),
            offset: 3,
            length: 5,
        }]
    );
    assert_eq!(outcome.matches[1].matches[0].offset, 9);

    let stats = engine.stats();
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.responses_routed, 2);
    assert_eq!(stats.stale_responses, 0);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_scan_without_rules_is_empty() {
    let engine = ScanEngine::with_host(SilentHost);
    let outcome = engine.scan_payload(b"anything").await.expect("scan");
    assert!(outcome.matches.is_empty());
    // answered locally, nothing sent
    assert_eq!(engine.stats().requests_sent, 0);
}

#[tokio::test]
async fn test_binary_payload_preserved() {
    let engine = ScanEngine::new(&ScanConfig::default());
    engine
        .compile_rules(&["rule bin { strings: $x = { 00 FF 80 ?? 7F } condition: $x }"])
        .await
        .expect("compile");
    let mut payload: Vec<u8> = (0..=255u8).rev().collect();
    payload.extend_from_slice(&[0x00, 0xff, 0x80, 0x0a, 0x7f]);
    let outcome = engine.scan_payload(&payload).await.expect("scan");
    assert_eq!(rule_names(&outcome), vec!["bin"]);
    assert_eq!(outcome.matches[0].matches[0].offset, 256);
}

#[tokio::test]
async fn test_concurrent_scans_not_swapped() {
    let engine = ScanEngine::with_host(ReversingHost { batch: 2 });
    engine.compile_rules(&[RULES]).await.expect("compile");

    let (first, second) = tokio::join!(
        engine.scan_payload(b"alpha only"),
        engine.scan_payload(b"only beta"),
    );
    assert_eq!(rule_names(&first.expect("first scan")), vec!["alpha"]);
    assert_eq!(rule_names(&second.expect("second scan")), vec!["beta"]);
}

#[tokio::test]
async fn test_many_concurrent_scans() {
    let engine = Arc::new(ScanEngine::with_host(ReversingHost { batch: 8 }));
    engine.compile_rules(&[RULES]).await.expect("compile");

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let payload = if n % 2 == 0 {
                    format!("{} alpha", n)
                } else {
                    format!("{} beta", n)
                };
                (n, engine.scan_payload(payload.as_bytes()).await)
            })
        })
        .collect();
    for task in tasks {
        let (n, outcome) = task.await.expect("join");
        let expected = if n % 2 == 0 { "alpha" } else { "beta" };
        assert_eq!(rule_names(&outcome.expect("scan")), vec![expected]);
    }
    assert_eq!(engine.pending_requests(), 0);
}

#[tokio::test]
async fn test_error_response_scoped_to_request() {
    let engine = ScanEngine::new(&ScanConfig::default());
    engine.compile_rules(&[RULES]).await.expect("compile");

    let (compiled, scanned) = tokio::join!(
        engine.compile_rules(&["rule broken { condition: $missing }"]),
        engine.scan_payload(b"alpha"),
    );
    match compiled {
        Err(ScanError::Rejected { reason, .. }) => assert!(reason.contains("$missing"), "{}", reason),
        other => panic!("unexpected {:?}", other),
    }
    // previous rule set still active
    assert_eq!(rule_names(&scanned.expect("scan")), vec!["alpha"]);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_terminate_rejects_pending() {
    let engine = Arc::new(ScanEngine::with_host(SilentHost));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.compile_rules(&["rule a { condition: true }"]).await })
        })
        .collect();
    wait_until(|| engine.pending_requests() == 3).await;
    assert_eq!(engine.state(), EngineState::AwaitingResponses);

    engine.terminate();
    for handle in handles {
        assert_eq!(handle.await.expect("join"), Err(ScanError::EngineTerminated));
    }
    assert_eq!(engine.state(), EngineState::Terminated);
    assert_eq!(engine.pending_requests(), 0);
    assert_eq!(
        engine.compile_rules(&["rule a { condition: true }"]).await,
        Err(ScanError::EngineTerminated)
    );
    assert_eq!(engine.scan_payload(b"x").await, Err(ScanError::EngineTerminated));
    // idempotent
    engine.terminate();
}

#[tokio::test]
async fn test_unit_exit_terminates_engine() {
    let engine = ScanEngine::with_host(CrashingHost);
    let err = engine
        .compile_rules(&["rule a { condition: true }"])
        .await
        .unwrap_err();
    assert_eq!(err, ScanError::EngineTerminated);
    assert_eq!(engine.state(), EngineState::Terminated);
}

#[tokio::test]
async fn test_stale_responses_ignored() {
    let engine = ScanEngine::with_host(StaleHost);
    let compiled = engine.compile_rules(&[RULES]).await.expect("compile");
    assert_eq!(compiled.rule_count, 2);
    let outcome = engine.scan_payload(b"beta").await.expect("scan");
    assert_eq!(rule_names(&outcome), vec!["beta"]);
    let stats = engine.stats();
    assert_eq!(stats.stale_responses, 2);
    assert_eq!(stats.responses_routed, 2);
}

#[tokio::test]
async fn test_unavailable_engine() {
    let engine = ScanEngine::with_host(NoIsolationHost);
    assert_eq!(engine.state(), EngineState::Unavailable);
    match engine.compile_rules(&[RULES]).await {
        Err(ScanError::EngineUnavailable(reason)) => assert!(reason.contains("isolation unsupported")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        engine.scan_payload(b"alpha").await,
        Err(ScanError::EngineUnavailable(_))
    ));
}

#[tokio::test]
async fn test_custom_worker_thread() {
    let config = ScanConfig {
        worker_name: "rules-under-test".to_owned(),
        worker_stack_size: Some(4 * 1024 * 1024),
    };
    let engine = ScanEngine::new(&config);
    let compiled = engine.compile_rules(&[RULES]).await.expect("compile");
    assert_eq!(compiled.rule_count, 2);
}
