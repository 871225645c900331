//! Prompt → background worker → reply, with the transcript only ever touched
//! from the thread that owns it.

use std::collections::BTreeSet;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context as AnyhowCtx, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::transcript::{LineKind, Transcript};

pub const FALLBACK_REPLY: &str =
    "I sense your words. The violet currents translate your intent. Ask further, and the echo will deepen.";
pub const PROCESSING: &str = "processing...";
const ATTRIBUTION_CHARS: usize = 40;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Blocking; only ever called from a worker thread.
    fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct OfflineBackend;
impl ChatBackend for OfflineBackend {
    fn name(&self) -> &str { "offline" }
    fn complete(&self, _prompt: &str) -> Result<String> { Ok(FALLBACK_REPLY.to_string()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage { pub role: String, pub content: String }

#[derive(Serialize)]
struct OllamaReq<'a> { model: &'a str, messages: &'a [ChatMessage], stream: bool }

#[derive(Deserialize)]
struct OllamaResp { message: ChatMessage }

#[derive(Clone)]
pub struct OllamaBackend { pub endpoint: String, pub model: String, pub system_prompt: String }
impl OllamaBackend {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), model: model.into(), system_prompt: system_prompt.into() }
    }

    pub fn messages(&self, prompt: &str) -> [ChatMessage; 2] {
        [
            ChatMessage { role: "system".into(), content: self.system_prompt.clone() },
            ChatMessage { role: "user".into(),   content: prompt.to_string() },
        ]
    }

    fn chat_url(&self) -> String {
        if self.endpoint.ends_with("/api/chat") {
            self.endpoint.clone()
        } else if self.endpoint.ends_with("/api/generate") {
            self.endpoint.replace("/api/generate", "/api/chat")
        } else {
            format!("{}/api/chat", self.endpoint.trim_end_matches('/'))
        }
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let messages = self.messages(prompt);
        let resp = client.post(self.chat_url())
            .json(&OllamaReq { model: &self.model, messages: &messages, stream: false })
            .send().await?.error_for_status()?.json::<OllamaResp>().await?;
        Ok(resp.message.content.trim().to_string())
    }

    /// Turns the usual Ollama failures into something the user can act on.
    pub fn describe_error(&self, e: &anyhow::Error) -> String {
        let raw = format!("{e:#}");
        if raw.contains("404") {
            format!("model not found, run: ollama pull {}", self.model)
        } else if raw.contains("Connection refused") || raw.contains("error sending request") {
            format!("ollama not reachable at {} ({raw})", self.endpoint)
        } else {
            raw
        }
    }
}
impl ChatBackend for OllamaBackend {
    fn name(&self) -> &str { "ollama" }
    fn complete(&self, prompt: &str) -> Result<String> {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()
            .context("building chat runtime")?;
        rt.block_on(self.call(prompt)).map_err(|e| anyhow::anyhow!(self.describe_error(&e)))
    }
}

fn endpoint_is_local(endpoint: &str) -> bool {
    endpoint.contains("localhost") || endpoint.contains("127.0.0.1")
}

fn endpoint_listening(endpoint: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(endpoint) else { return false };
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else { return false };
    let Ok(addrs) = (host, port).to_socket_addrs() else { return false };
    addrs.into_iter().any(|a| TcpStream::connect_timeout(&a, PROBE_TIMEOUT).is_ok())
}

/// Decides once, at startup, which backend answers prompts.
pub fn bind_backend(config: &Config) -> Arc<dyn ChatBackend> {
    if !config.ai_enabled {
        log::info!("chat service disabled in config, using canned replies");
        return Arc::new(OfflineBackend);
    }
    if endpoint_is_local(&config.ai_endpoint) && !endpoint_listening(&config.ai_endpoint) {
        log::warn!("nothing listening at {}, using canned replies", config.ai_endpoint);
        return Arc::new(OfflineBackend);
    }
    log::info!("chat service: ollama {} ({})", config.ai_model, config.ai_endpoint);
    Arc::new(OllamaBackend::new(&config.ai_endpoint, &config.ai_model, &config.ai_system_prompt))
}

pub type RequestId = u64;
pub type Waker = Arc<dyn Fn() + Send + Sync>;

pub struct ChatReply {
    pub id:      RequestId,
    pub prompt:  String,
    pub outcome: Result<String, String>,
}

pub struct ChatPipeline {
    backend:    Arc<dyn ChatBackend>,
    latency:    Duration,
    tx:         Sender<ChatReply>,
    rx:         Receiver<ChatReply>,
    pending:    BTreeSet<RequestId>,
    next_id:    RequestId,
    dispatched: usize,
    waker:      Option<Waker>,
}

impl ChatPipeline {
    pub fn new(backend: Arc<dyn ChatBackend>, latency: Duration) -> Self {
        let (tx, rx) = unbounded();
        Self { backend, latency, tx, rx, pending: BTreeSet::new(), next_id: 1, dispatched: 0, waker: None }
    }

    /// Called from workers after they publish, so the UI wakes up to drain.
    pub fn set_waker(&mut self, waker: Waker) { self.waker = Some(waker); }

    pub fn backend_name(&self) -> &str { self.backend.name() }
    pub fn in_flight(&self) -> usize { self.pending.len() }
    pub fn dispatched(&self) -> usize { self.dispatched }

    pub fn submit(&mut self, input: &str, transcript: &mut Transcript) -> Option<RequestId> {
        let prompt = input.trim();
        if prompt.is_empty() { return None; }

        transcript.push(LineKind::User, prompt);
        transcript.push(LineKind::Status, PROCESSING);

        let id = self.next_id;
        self.next_id += 1;
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let waker = self.waker.clone();
        let latency = self.latency;
        let owned = prompt.to_string();

        let spawned = thread::Builder::new().name(format!("chat-{id}")).spawn(move || {
            thread::sleep(latency);
            let outcome = backend.complete(&owned).map_err(|e| format!("{e:#}"));
            if let Err(e) = &outcome { log::warn!("chat request {id} failed: {e}"); }
            log::debug!("chat request {id} finished");
            if tx.send(ChatReply { id, prompt: owned, outcome }).is_ok() {
                if let Some(wake) = waker { wake(); }
            }
        });

        match spawned {
            Ok(_) => {
                log::debug!("chat request {id} dispatched to {}", self.backend.name());
                self.pending.insert(id);
                self.dispatched += 1;
                Some(id)
            }
            Err(e) => {
                log::warn!("could not spawn chat worker: {e}");
                transcript.push(LineKind::Error, format!("static noise: {e}"));
                None
            }
        }
    }

    /// Appends every reply that has arrived. UI thread only.
    pub fn drain(&mut self, transcript: &mut Transcript) -> usize {
        let mut n = 0;
        while let Ok(reply) = self.rx.try_recv() {
            let overtook = self.pending.first().is_some_and(|oldest| *oldest < reply.id);
            self.pending.remove(&reply.id);
            let (kind, body) = match reply.outcome {
                Ok(text) => (LineKind::Reply, text),
                Err(e)   => (LineKind::Error, format!("static noise: {e}")),
            };
            let text = if overtook { format!("{} {body}", attribution(&reply.prompt)) } else { body };
            transcript.push(kind, text);
            n += 1;
        }
        n
    }
}

fn attribution(prompt: &str) -> String {
    let mut short: String = prompt.chars().take(ATTRIBUTION_CHARS).collect();
    if prompt.chars().count() > ATTRIBUTION_CHARS { short.push('…'); }
    format!("(re: \"{short}\")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const QUICK: Duration = Duration::from_millis(10);

    fn pump(pipe: &mut ChatPipeline, t: &mut Transcript, want: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = 0;
        while got < want && Instant::now() < deadline {
            got += pipe.drain(t);
            thread::sleep(Duration::from_millis(5));
        }
        got
    }

    struct FailOnce { calls: AtomicUsize }
    impl ChatBackend for FailOnce {
        fn name(&self) -> &str { "fail-once" }
        fn complete(&self, prompt: &str) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("the spirits are silent");
            }
            Ok(format!("echo: {prompt}"))
        }
    }

    struct SlowFirst;
    impl ChatBackend for SlowFirst {
        fn name(&self) -> &str { "slow-first" }
        fn complete(&self, prompt: &str) -> Result<String> {
            if prompt == "first" { thread::sleep(Duration::from_millis(300)); }
            Ok(format!("answer to {prompt}"))
        }
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut pipe = ChatPipeline::new(Arc::new(OfflineBackend), QUICK);
        let mut t = Transcript::new(100);
        assert_eq!(pipe.submit("", &mut t), None);
        assert_eq!(pipe.submit("  \t\n ", &mut t), None);
        assert!(t.is_empty());
        assert_eq!(pipe.dispatched(), 0);
        assert_eq!(pipe.in_flight(), 0);
    }

    #[test]
    fn offline_reply_is_the_fallback_text() {
        for _ in 0..3 {
            let mut pipe = ChatPipeline::new(Arc::new(OfflineBackend), QUICK);
            let mut t = Transcript::new(100);
            assert!(pipe.submit("  hello ", &mut t).is_some());
            assert_eq!(pump(&mut pipe, &mut t, 1), 1);
            let lines: Vec<_> = t.lines().collect();
            assert_eq!(lines.len(), 3);
            assert_eq!(lines[0].display(), "You: hello");
            assert_eq!(lines[1].kind, LineKind::Status);
            assert_eq!(lines[1].text, PROCESSING);
            assert_eq!(lines[2].kind, LineKind::Reply);
            assert_eq!(lines[2].text, FALLBACK_REPLY);
            assert_eq!(pipe.in_flight(), 0);
        }
    }

    #[test]
    fn echo_and_status_are_written_before_the_worker_answers() {
        let mut pipe = ChatPipeline::new(Arc::new(OfflineBackend), Duration::from_millis(200));
        let mut t = Transcript::new(100);
        pipe.submit("hello", &mut t);
        assert_eq!(t.len(), 2);
        assert_eq!(pipe.drain(&mut t), 0);
        assert_eq!(pipe.in_flight(), 1);
    }

    #[test]
    fn failure_is_reported_and_pipeline_stays_usable() {
        let mut pipe = ChatPipeline::new(Arc::new(FailOnce { calls: AtomicUsize::new(0) }), QUICK);
        let mut t = Transcript::new(100);
        pipe.submit("boo", &mut t);
        assert_eq!(pump(&mut pipe, &mut t, 1), 1);
        let err = t.last().unwrap();
        assert_eq!(err.kind, LineKind::Error);
        assert!(err.text.starts_with("static noise:"));
        assert!(err.text.contains("the spirits are silent"));

        pipe.submit("again", &mut t);
        assert_eq!(pump(&mut pipe, &mut t, 1), 1);
        let ok = t.last().unwrap();
        assert_eq!(ok.kind, LineKind::Reply);
        assert_eq!(ok.text, "echo: again");
    }

    #[test]
    fn overlapping_requests_each_deliver_once() {
        let mut pipe = ChatPipeline::new(Arc::new(SlowFirst), QUICK);
        let mut t = Transcript::new(100);
        let a = pipe.submit("first", &mut t).unwrap();
        let b = pipe.submit("second", &mut t).unwrap();
        assert!(b > a);
        assert_eq!(pipe.in_flight(), 2);
        assert_eq!(pump(&mut pipe, &mut t, 2), 2);
        assert_eq!(pipe.in_flight(), 0);

        // "second" overtakes "first", so it names the prompt it answers
        let replies: Vec<_> = t.lines().filter(|l| l.kind == LineKind::Reply).map(|l| l.text.as_str()).collect();
        assert_eq!(replies, ["(re: \"second\") answer to second", "answer to first"]);
    }

    #[test]
    fn waker_fires_per_reply() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut pipe = ChatPipeline::new(Arc::new(OfflineBackend), QUICK);
        pipe.set_waker(Arc::new(move || { counter.fetch_add(1, Ordering::SeqCst); }));
        let mut t = Transcript::new(100);
        pipe.submit("one", &mut t);
        pipe.submit("two", &mut t);
        assert_eq!(pump(&mut pipe, &mut t, 2), 2);
        // workers wake the UI after publishing, so the last wake may trail the drain
        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn attribution_truncates_long_prompts() {
        let long = "x".repeat(60);
        let tag = attribution(&long);
        assert!(tag.ends_with("…\")"));
        assert_eq!(tag.chars().filter(|c| *c == 'x').count(), ATTRIBUTION_CHARS);
    }

    #[test]
    fn disabled_config_binds_offline_backend() {
        let config = Config { ai_enabled: false, ..Config::default() };
        assert_eq!(bind_backend(&config).name(), "offline");
    }

    #[test]
    fn silent_local_endpoint_binds_offline_backend() {
        let config = Config { ai_endpoint: "http://127.0.0.1:1/api/chat".into(), ..Config::default() };
        assert!(config.ai_enabled);
        assert_eq!(bind_backend(&config).name(), "offline");
    }

    #[test]
    fn remote_endpoint_binds_ollama_without_probing() {
        let config = Config { ai_endpoint: "http://example.invalid/api/chat".into(), ..Config::default() };
        assert_eq!(bind_backend(&config).name(), "ollama");
    }

    #[test]
    fn ollama_request_is_system_then_user() {
        let b = OllamaBackend::new("http://localhost:11434", "llama3", "You are KAISEL.");
        let [sys, user] = b.messages("hi");
        assert_eq!((sys.role.as_str(), sys.content.as_str()), ("system", "You are KAISEL."));
        assert_eq!((user.role.as_str(), user.content.as_str()), ("user", "hi"));
        assert_eq!(b.chat_url(), "http://localhost:11434/api/chat");
        let g = OllamaBackend::new("http://localhost:11434/api/generate", "llama3", "");
        assert_eq!(g.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn missing_model_error_suggests_pull() {
        let b = OllamaBackend::new("http://localhost:11434/api/chat", "llama3", "");
        let msg = b.describe_error(&anyhow::anyhow!("HTTP status client error (404 Not Found)"));
        assert_eq!(msg, "model not found, run: ollama pull llama3");
    }
}
