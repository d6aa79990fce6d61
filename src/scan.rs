//! Signature scanning through an isolated execution unit
//!
//! A [`ScanEngine`] owns one execution unit (by default a [`RuleWorker`] on a dedicated
//! thread) and talks to it only through JSON messages. Every request carries a fresh id;
//! responses may arrive in any order and are routed back to the caller awaiting that id.
//!
//! ```rust
//! use pcap_forensics::config::ScanConfig;
//! use pcap_forensics::scan::ScanEngine;
//!
//! # tokio_test_block_on(async {
//! let engine = ScanEngine::new(&ScanConfig::default());
//! let compiled = engine
//!     .compile_rules(&[r#"rule mz { strings: $mz = "MZ" condition: $mz }"#])
//!     .await
//!     .unwrap();
//! assert_eq!(compiled.rule_count, 1);
//! let scanned = engine.scan_payload(b"..MZ..").await.unwrap();
//! assert_eq!(scanned.matches[0].matches[0].offset, 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod rules;
mod ruleset;
mod wire;
mod worker;

pub use rules::{parse_rules, Condition, MetaValue, Modifiers, Pattern, Quantifier, RuleDef, StringDef};
pub use ruleset::RuleSet;
pub use wire::{latin1, Request, Response, RuleMatch, StringMatch};
pub use worker::{RuleWorker, ThreadHost, UnitHost, UnitPort};

use crate::config::ScanConfig;
use crate::error::ScanError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of a [`ScanEngine`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// The execution unit could not be created; every request fails
    Unavailable,
    Ready,
    /// At least one request is waiting for its response
    AwaitingResponses,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOutcome {
    pub rule_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub matches: Vec<RuleMatch>,
}

/// Message counters since construction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub requests_sent: u64,
    pub responses_routed: u64,
    /// Responses whose id matched no pending request
    pub stale_responses: u64,
}

type Reply<T> = oneshot::Sender<Result<T, ScanError>>;

enum Pending {
    Compile(Reply<CompileOutcome>),
    Scan(Reply<ScanOutcome>),
}

impl Pending {
    fn reject(self, err: ScanError) {
        // the caller may have stopped waiting
        match self {
            Pending::Compile(tx) => {
                let _ = tx.send(Err(err));
            }
            Pending::Scan(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

/// State shared between callers and the response dispatcher
struct Shared {
    pending: Mutex<HashMap<u64, Pending>>,
    /// Only written with `pending` locked
    terminated: AtomicBool,
    rules_active: AtomicBool,
    stats: Mutex<EngineStats>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            pending: Mutex::new(HashMap::new()),
            terminated: AtomicBool::new(false),
            rules_active: AtomicBool::new(false),
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// Mark terminated and reject everything pending. Returns the number rejected.
    fn fail_all(&self) -> usize {
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock();
            self.terminated.store(true, Ordering::SeqCst);
            pending.drain().map(|(_, p)| p).collect()
        };
        let count = drained.len();
        for p in drained {
            p.reject(ScanError::EngineTerminated);
        }
        count
    }

    fn route(&self, raw: &str) {
        let response: Response = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed response from execution unit");
                self.reject_malformed(raw, e.to_string());
                return;
            }
        };
        let id = response.id();
        let pending = self.pending.lock().remove(&id);
        let pending = match pending {
            Some(p) => p,
            None => {
                debug!(id, "response matches no pending request, ignored");
                self.stats.lock().stale_responses += 1;
                return;
            }
        };
        self.stats.lock().responses_routed += 1;
        match (pending, response) {
            (Pending::Compile(tx), Response::CompileResult { success: true, rule_count, .. }) => {
                self.rules_active.store(true, Ordering::SeqCst);
                let _ = tx.send(Ok(CompileOutcome {
                    rule_count: rule_count.unwrap_or(0),
                }));
            }
            (Pending::Compile(tx), Response::CompileResult { error, .. }) => {
                let _ = tx.send(Err(rejected(id, error)));
            }
            (Pending::Scan(tx), Response::ScanResult { success: true, matches, .. }) => {
                let _ = tx.send(Ok(ScanOutcome {
                    matches: matches.unwrap_or_default(),
                }));
            }
            (Pending::Scan(tx), Response::ScanResult { error, .. }) => {
                let _ = tx.send(Err(rejected(id, error)));
            }
            (pending, response) => {
                warn!(id, kind = response.kind(), "response type does not match request");
                pending.reject(ScanError::Protocol(format!(
                    "unexpected {} for request {}",
                    response.kind(),
                    id
                )));
            }
        }
    }

    /// An undecodable response still fails its request when an id can be recovered
    fn reject_malformed(&self, raw: &str, reason: String) {
        let id = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64));
        if let Some(p) = id.and_then(|id| self.pending.lock().remove(&id)) {
            p.reject(ScanError::Protocol(reason));
        }
    }
}

fn rejected(id: u64, error: Option<String>) -> ScanError {
    ScanError::Rejected {
        id,
        reason: error.unwrap_or_else(|| "request failed".to_owned()),
    }
}

fn dispatch(shared: Arc<Shared>, responses: mpsc::Receiver<String>) {
    for raw in responses.iter() {
        shared.route(&raw);
    }
    if !shared.terminated.load(Ordering::SeqCst) {
        warn!("execution unit exited");
    }
    let rejected = shared.fail_all();
    debug!(rejected, "response dispatcher stopped");
}

/// Client side of the signature scanning engine
///
/// Requests are async and may be issued concurrently from several tasks; the engine is
/// `Send + Sync`. Dropping the engine tears it down as [`terminate`](Self::terminate) does.
pub struct ScanEngine {
    shared: Arc<Shared>,
    requests: Mutex<Option<mpsc::Sender<String>>>,
    unavailable: Option<String>,
    next_id: AtomicU64,
}

impl ScanEngine {
    /// Engine backed by a [`RuleWorker`] thread configured from `config`
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_host(ThreadHost::new(config))
    }

    /// Engine whose execution unit is launched by `host`. A launch failure leaves the
    /// engine [`Unavailable`](EngineState::Unavailable) instead of failing construction.
    pub fn with_host<H: UnitHost>(host: H) -> Self {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let shared = Arc::new(Shared::new());
        let port = UnitPort {
            requests: request_rx,
            responses: response_tx,
        };
        if let Err(e) = host.launch(port) {
            warn!(error = %e, "execution unit could not be launched");
            return Self::unavailable(shared, e.to_string());
        }
        let dispatch_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("scan-dispatch".to_owned())
            .spawn(move || dispatch(dispatch_shared, response_rx));
        if let Err(e) = spawned {
            warn!(error = %e, "response dispatcher could not be started");
            return Self::unavailable(shared, e.to_string());
        }
        debug!("scan engine ready");
        ScanEngine {
            shared,
            requests: Mutex::new(Some(request_tx)),
            unavailable: None,
            next_id: AtomicU64::new(1),
        }
    }

    fn unavailable(shared: Arc<Shared>, reason: String) -> Self {
        ScanEngine {
            shared,
            requests: Mutex::new(None),
            unavailable: Some(reason),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.unavailable.is_some() {
            EngineState::Unavailable
        } else if self.shared.terminated.load(Ordering::SeqCst) {
            EngineState::Terminated
        } else if self.shared.pending.lock().is_empty() {
            EngineState::Ready
        } else {
            EngineState::AwaitingResponses
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn stats(&self) -> EngineStats {
        *self.shared.stats.lock()
    }

    /// Replace the active rule set. On failure the previous set stays active.
    pub async fn compile_rules<S: AsRef<str>>(
        &self,
        sources: &[S],
    ) -> Result<CompileOutcome, ScanError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = sources.iter().map(|s| s.as_ref().to_owned()).collect();
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Compile { id, payload }, Pending::Compile(tx))?;
        rx.await.unwrap_or(Err(ScanError::EngineTerminated))
    }

    /// Scan `bytes` with the active rule set. Without one, resolves at once with no matches.
    pub async fn scan_payload(&self, bytes: &[u8]) -> Result<ScanOutcome, ScanError> {
        self.check_usable()?;
        if !self.shared.rules_active.load(Ordering::SeqCst) {
            return Ok(ScanOutcome::default());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let request = Request::Scan {
            id,
            payload: bytes.to_vec(),
        };
        self.submit(request, Pending::Scan(tx))?;
        rx.await.unwrap_or(Err(ScanError::EngineTerminated))
    }

    /// Release the execution unit and reject every pending request. Idempotent.
    pub fn terminate(&self) {
        let sender = self.requests.lock().take();
        if sender.is_none() {
            return;
        }
        // closing the request channel stops the unit
        drop(sender);
        let rejected = self.shared.fail_all();
        debug!(rejected, "scan engine terminated");
    }

    fn check_usable(&self) -> Result<(), ScanError> {
        if let Some(reason) = &self.unavailable {
            return Err(ScanError::EngineUnavailable(reason.clone()));
        }
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(ScanError::EngineTerminated);
        }
        Ok(())
    }

    fn submit(&self, request: Request, pending: Pending) -> Result<(), ScanError> {
        self.check_usable()?;
        let id = request.id();
        let raw = serde_json::to_string(&request).map_err(|e| ScanError::Protocol(e.to_string()))?;
        let requests = self.requests.lock();
        let sender = requests.as_ref().ok_or(ScanError::EngineTerminated)?;
        {
            let mut map = self.shared.pending.lock();
            if self.shared.terminated.load(Ordering::SeqCst) {
                return Err(ScanError::EngineTerminated);
            }
            map.insert(id, pending);
        }
        if sender.send(raw).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(ScanError::EngineTerminated);
        }
        self.shared.stats.lock().requests_sent += 1;
        debug!(id, "request sent");
        Ok(())
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingHost;

    impl UnitHost for FailingHost {
        fn launch(self, _port: UnitPort) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no isolation available"))
        }
    }

    #[test]
    fn test_routing_unknown_and_mismatched() {
        let shared = Shared::new();
        shared.route(r#"{"type":"scanResult","id":42,"success":true,"matches":[]}"#);
        assert_eq!(shared.stats.lock().stale_responses, 1);

        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(5, Pending::Scan(tx));
        shared.route(r#"{"type":"compileResult","id":5,"success":true,"ruleCount":1}"#);
        match rx.try_recv() {
            Ok(Err(ScanError::Protocol(_))) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!shared.rules_active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_malformed_response_with_id() {
        let shared = Shared::new();
        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(3, Pending::Compile(tx));
        shared.route(r#"{"type":"bogus","id":3}"#);
        assert!(matches!(rx.try_recv(), Ok(Err(ScanError::Protocol(_)))));
        assert!(shared.pending.lock().is_empty());
    }

    #[test]
    fn test_fail_all_once() {
        let shared = Shared::new();
        let (tx, mut rx) = oneshot::channel();
        shared.pending.lock().insert(1, Pending::Scan(tx));
        assert_eq!(shared.fail_all(), 1);
        assert_eq!(shared.fail_all(), 0);
        assert!(matches!(rx.try_recv(), Ok(Err(ScanError::EngineTerminated))));
    }

    #[tokio::test]
    async fn test_unavailable_engine() {
        let engine = ScanEngine::with_host(FailingHost);
        assert_eq!(engine.state(), EngineState::Unavailable);
        assert!(matches!(
            engine.scan_payload(b"x").await,
            Err(ScanError::EngineUnavailable(_))
        ));
        let err = engine.compile_rules(&["rule a { condition: true }"]).await.unwrap_err();
        assert!(err.to_string().contains("no isolation available"));
        engine.terminate();
        assert_eq!(engine.state(), EngineState::Unavailable);
    }
}
