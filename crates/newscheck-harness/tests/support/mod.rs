//! Stand-ins for a news engine used by the harness integration tests.
//!
//! Shell scripts play the engine binary for process-level tests; [`FakeEngine`]
//! serves the HTTP contract in-process so the server scenario can run without
//! a real engine.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use newscheck_core::config::RetryConfig;
use newscheck_core::{Error, Result};
use newscheck_harness::ServerControl;
use serde_json::json;
use tiny_http::{Method, Request, Response, Server};

/// Write an executable `sh` script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Should write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Should make script executable");
    path
}

/// Write `count` small articles into `dir` and return their names.
pub fn write_articles(dir: &Path, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let name = format!("{i:04}.html");
            std::fs::write(
                dir.join(&name),
                format!("<html><head><title>Story {i}</title></head></html>"),
            )
            .expect("Should write article");
            name
        })
        .collect()
}

/// Retry budgets short enough for tests.
pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        connect_window_ms: 2_000,
        connect_interval_ms: 20,
        unavailable_window_ms: 2_000,
        unavailable_interval_ms: 20,
        request_timeout_ms: 5_000,
    }
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 only checks for existence.
    let exists = unsafe { libc::kill(pid as libc::pid_t, 0) == 0 };
    exists && !is_zombie(pid)
}

/// Orphans wait for init to reap them; count those as dead.
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Should bind ephemeral port");
    listener.local_addr().expect("Should have local addr").port()
}

/// How the fake engine deviates from a healthy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Healthy,
    /// Answer the first `n` requests after each start with 503.
    WarmUp(usize),
    /// Answer every PUT with 500.
    RejectPut,
    /// Leave `category` out of ranked threads.
    OmitCategory,
}

/// What the fake engine observed and stores.
#[derive(Debug, Default)]
pub struct EngineState {
    pub articles: BTreeMap<String, Vec<u8>>,
    pub max_ages: Vec<u64>,
    pub content_types: Vec<String>,
    pub queries: Vec<String>,
    pub puts: Vec<u16>,
    pub deletes: Vec<u16>,
    pub user_agents: Vec<String>,
    pub unavailable_replies: usize,
    pending_unavailable: usize,
}

struct Running {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// In-process engine server whose index survives restarts.
pub struct FakeEngine {
    port: u16,
    behavior: Behavior,
    state: Arc<Mutex<EngineState>>,
    running: Option<Running>,
    pub starts: usize,
    pub stops: usize,
}

impl FakeEngine {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            port: free_port(),
            behavior,
            state: Arc::new(Mutex::new(EngineState::default())),
            running: None,
            starts: 0,
            stops: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state poisoned")
    }

    fn bind(&self) -> Result<Server> {
        // The previous listener closes asynchronously after a stop.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match Server::http(("127.0.0.1", self.port)) {
                Ok(server) => return Ok(server),
                Err(e) if Instant::now() >= deadline => {
                    return Err(Error::Process(format!("cannot bind fake engine: {e}")))
                }
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
    }
}

impl ServerControl for FakeEngine {
    fn start(&mut self, port: u16) -> Result<u32> {
        if port != self.port {
            return Err(Error::Process(format!("unexpected port {port}")));
        }
        if self.running.is_some() {
            return Err(Error::Process("fake engine already running".to_string()));
        }

        let server = self.bind()?;
        if let Behavior::WarmUp(n) = self.behavior {
            self.state().pending_unavailable = n;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&shutdown);
        let state = Arc::clone(&self.state);
        let behavior = self.behavior;
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::SeqCst) {
                match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(request)) => serve(request, behavior, &state),
                    Ok(None) => {}
                    Err(_) => break,
                }
            }
        });

        self.running = Some(Running { shutdown, handle });
        self.starts += 1;
        Ok(std::process::id())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(running) = self.running.take() {
            running.shutdown.store(true, Ordering::SeqCst);
            let _ = running.handle.join();
            self.stops += 1;
        }
        Ok(())
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn serve(mut request: Request, behavior: Behavior, state: &Mutex<EngineState>) {
    let mut state = state.lock().expect("engine state poisoned");

    if state.pending_unavailable > 0 {
        state.pending_unavailable -= 1;
        state.unavailable_replies += 1;
        let _ = request.respond(Response::from_string("warming up").with_status_code(503));
        return;
    }

    if let Some(agent) = header(&request, "User-Agent") {
        state.user_agents.push(agent);
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let name = url.trim_start_matches('/').to_string();

    let (status, body) = match method {
        Method::Put => {
            let mut content = Vec::new();
            let _ = request.as_reader().read_to_end(&mut content);
            if let Some(value) = header(&request, "Cache-Control") {
                if let Some(age) = value.strip_prefix("max-age=") {
                    state.max_ages.push(age.parse().unwrap_or(0));
                }
            }
            if let Some(value) = header(&request, "Content-Type") {
                state.content_types.push(value);
            }

            let status = if behavior == Behavior::RejectPut {
                500
            } else if state.articles.insert(name, content).is_some() {
                204
            } else {
                201
            };
            state.puts.push(status);
            let body = if status == 500 { "index failure" } else { "" };
            (status, body.to_string())
        }
        Method::Delete => {
            let status = if state.articles.remove(&name).is_some() {
                204
            } else {
                404
            };
            state.deletes.push(status);
            (status, String::new())
        }
        Method::Get if url.starts_with("/threads?") => {
            state.queries.push(url.clone());
            (200, ranked_threads(&state, behavior))
        }
        _ => (404, String::new()),
    };

    drop(state);
    let _ = request.respond(Response::from_string(body).with_status_code(status));
}

fn header(request: &Request, field: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(field))
        .map(|h| h.value.as_str().to_string())
}

fn ranked_threads(state: &EngineState, behavior: Behavior) -> String {
    let names: Vec<&String> = state.articles.keys().collect();
    let mut threads = Vec::new();
    if !names.is_empty() {
        let mut thread = json!({ "title": "Top story", "articles": names });
        if behavior != Behavior::OmitCategory {
            thread["category"] = json!("society");
        }
        threads.push(thread);
    }
    json!({ "threads": threads }).to_string()
}
