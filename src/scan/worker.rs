//! The isolated side of the scan engine.
//!
//! A [`RuleWorker`] owns the compiled rule set and answers one request at a time. It only
//! talks to the engine through a [`UnitPort`] carrying JSON text, so the unit shares no
//! state with its caller. A [`UnitHost`] decides where the worker runs; [`ThreadHost`]
//! gives it a dedicated named thread.

use crate::config::ScanConfig;
use crate::scan::ruleset::RuleSet;
use crate::scan::wire::{Request, Response};
use std::io;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use tracing::{debug, warn};

/// Both ends of the message channel, as seen from the execution unit
#[derive(Debug)]
pub struct UnitPort {
    pub requests: Receiver<String>,
    pub responses: Sender<String>,
}

/// Launches an execution unit serving a [`UnitPort`]
///
/// The unit is expected to answer every well-formed request exactly once, in any order,
/// and to drop its response sender when the request channel closes.
pub trait UnitHost {
    fn launch(self, port: UnitPort) -> io::Result<()>;
}

/// Runs a [`RuleWorker`] on its own thread
#[derive(Clone, Debug)]
pub struct ThreadHost {
    name: String,
    stack_size: Option<usize>,
}

impl ThreadHost {
    pub fn new(config: &ScanConfig) -> Self {
        ThreadHost {
            name: config.worker_name.clone(),
            stack_size: config.worker_stack_size,
        }
    }
}

impl Default for ThreadHost {
    fn default() -> Self {
        ThreadHost::new(&ScanConfig::default())
    }
}

impl UnitHost for ThreadHost {
    fn launch(self, port: UnitPort) -> io::Result<()> {
        let mut builder = thread::Builder::new().name(self.name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || RuleWorker::default().serve(port))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RuleWorker {
    rules: Option<RuleSet>,
}

impl RuleWorker {
    /// Answer one request. A failed compile leaves the current rule set in place.
    pub fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Compile { id, payload } => match RuleSet::compile(payload.as_slice()) {
                Ok(set) => {
                    let count = set.len();
                    let names: Vec<&str> = set.rule_names().collect();
                    debug!(id, rules = count, names = ?names, "rule set compiled");
                    self.rules = Some(set);
                    Response::compiled(id, count)
                }
                Err(e) => {
                    debug!(id, error = %e, "rule compilation failed");
                    Response::compile_failed(id, e.to_string())
                }
            },
            Request::Scan { id, payload } => match &self.rules {
                Some(set) => Response::scanned(id, set.scan(&payload)),
                None => Response::scan_failed(id, "no rules compiled"),
            },
        }
    }

    /// Answer one JSON-encoded request. Malformed requests are dropped.
    pub fn handle_message(&mut self, raw: &str) -> Option<String> {
        let request: Request = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed request dropped");
                return None;
            }
        };
        let response = self.handle(request);
        match serde_json::to_string(&response) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(id = response.id(), error = %e, "could not encode response");
                None
            }
        }
    }

    /// Serve requests until either side of the port closes
    pub fn serve(mut self, port: UnitPort) {
        for raw in port.requests.iter() {
            if let Some(reply) = self.handle_message(&raw) {
                if port.responses.send(reply).is_err() {
                    break;
                }
            }
        }
        debug!("rule worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_scan_before_compile() {
        let mut worker = RuleWorker::default();
        let resp = worker.handle(Request::Scan {
            id: 1,
            payload: b"abc".to_vec(),
        });
        assert_eq!(resp, Response::scan_failed(1, "no rules compiled"));
    }

    #[test]
    fn test_failed_compile_keeps_rules() {
        let mut worker = RuleWorker::default();
        let resp = worker.handle(Request::Compile {
            id: 1,
            payload: vec!["rule a { strings: $a = \"abc\" condition: $a }".into()],
        });
        assert_eq!(resp, Response::compiled(1, 1));
        let resp = worker.handle(Request::Compile {
            id: 2,
            payload: vec!["rule broken {".into()],
        });
        assert!(matches!(resp, Response::CompileResult { success: false, error: Some(_), .. }));
        let resp = worker.handle(Request::Scan {
            id: 3,
            payload: b"xxabc".to_vec(),
        });
        match resp {
            Response::ScanResult {
                id: 3,
                success: true,
                matches: Some(matches),
                ..
            } => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].rule, "a");
                assert_eq!(matches[0].matches[0].offset, 2);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_serve_over_port() {
        let (req_tx, req_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        ThreadHost::default()
            .launch(UnitPort {
                requests: req_rx,
                responses: resp_tx,
            })
            .expect("spawn worker");
        req_tx.send("not json".to_owned()).expect("send");
        req_tx
            .send(r#"{"type":"compile","id":9,"payload":["rule t { condition: true }"]}"#.to_owned())
            .expect("send");
        let raw = resp_rx.recv().expect("response");
        let resp: Response = serde_json::from_str(&raw).expect("valid response");
        assert_eq!(resp, Response::compiled(9, 1));
        drop(req_tx);
        // worker exits and closes its side
        assert!(resp_rx.recv().is_err());
    }
}
