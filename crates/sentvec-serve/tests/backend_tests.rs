use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sentvec_core::config::Settings;
use sentvec_core::pipeline::run_streaming;
use sentvec_core::scoring::parse_vector_line;
use sentvec_core::{Embedder, PoolingStrategy, SessionState, Tokenization};
use sentvec_serve::lifecycle::{ServerConfig, ServerLauncher, ServerProcess};
use sentvec_serve::{BackendSession, BackendSpec, Endpoint, HostedEncoder, ServedClient, ServedPort};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// `None` when the peer hangs up without sending a request (readiness probes).
fn read_request(stream: &mut TcpStream) -> Option<(String, serde_json::Value)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 { return None; }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") { break pos + 4; }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let len = head
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);
    while buf.len() < header_end + len {
        let n = stream.read(&mut chunk).unwrap();
        buf.extend_from_slice(&chunk[..n]);
    }
    let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
    Some((path, serde_json::from_slice(&buf[header_end..header_end + len]).unwrap()))
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let reply = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(reply.as_bytes()).unwrap();
}

/// Vector for a text: `[token count, byte length]`.
fn toy_vector(v: &serde_json::Value) -> Vec<f32> {
    match v {
        serde_json::Value::String(s) => vec![s.split_whitespace().count() as f32, s.len() as f32],
        serde_json::Value::Array(tokens) => {
            let joined: Vec<&str> = tokens.iter().filter_map(|t| t.as_str()).collect();
            vec![joined.len() as f32, joined.join(" ").len() as f32]
        }
        _ => panic!("unexpected text {v}"),
    }
}

/// Serves `/encode` until `stop` is set and a wake-up connection arrives.
fn spawn_encode_server(listener: TcpListener, stop: Arc<AtomicBool>, seen_tokenized: Arc<AtomicUsize>) -> JoinHandle<()> {
    thread::spawn(move || {
        for stream in listener.incoming() {
            if stop.load(Ordering::SeqCst) { break; }
            let Ok(mut stream) = stream else { continue };
            let Some((path, body)) = read_request(&mut stream) else { continue };
            assert_eq!(path, "/encode");
            if body["is_tokenized"].as_bool() == Some(true) { seen_tokenized.fetch_add(1, Ordering::SeqCst); }
            let result: Vec<Vec<f32>> = body["texts"].as_array().unwrap().iter().map(toy_vector).collect();
            let reply = serde_json::json!({ "id": body["id"], "result": result, "status": 200 });
            respond(&mut stream, "200 OK", &reply.to_string());
        }
    })
}

#[derive(Default)]
struct Counters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    tokenized_requests: Arc<AtomicUsize>,
}

struct FakeLauncher {
    counters: Arc<Counters>,
}

struct FakeServer {
    counters: Arc<Counters>,
    http_port: u16,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ServerLauncher for FakeLauncher {
    fn launch(&self, config: &ServerConfig) -> anyhow::Result<Box<dyn ServerProcess>> {
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        assert!(config.to_args().contains(&"-pooling_strategy".to_string()));
        let listener = TcpListener::bind(("127.0.0.1", config.endpoint.http_port))?;
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_encode_server(listener, stop.clone(), self.counters.tokenized_requests.clone());
        Ok(Box::new(FakeServer { counters: self.counters.clone(), http_port: config.endpoint.http_port, stop, handle: Some(handle) }))
    }
}

impl ServerProcess for FakeServer {
    fn exit_status(&mut self) -> anyhow::Result<Option<String>> { Ok(None) }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(("127.0.0.1", self.http_port));
        if let Some(handle) = self.handle.take() { handle.join().unwrap(); }
        Ok(())
    }
}

/// Fails its readiness check: nothing listens and it reports an exit.
struct CrashingLauncher;
struct Crashed;

impl ServerLauncher for CrashingLauncher {
    fn launch(&self, _config: &ServerConfig) -> anyhow::Result<Box<dyn ServerProcess>> { Ok(Box::new(Crashed)) }
}

impl ServerProcess for Crashed {
    fn exit_status(&mut self) -> anyhow::Result<Option<String>> { Ok(Some("exit status: 1".into())) }
    fn stop(&mut self) -> anyhow::Result<()> { Ok(()) }
}

#[derive(Default)]
struct CountingCrashLauncher {
    launches: AtomicUsize,
}

impl ServerLauncher for CountingCrashLauncher {
    fn launch(&self, _config: &ServerConfig) -> anyhow::Result<Box<dyn ServerProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Crashed))
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.served.default_port = free_port();
    settings.served.http_port = free_port();
    settings.served.startup_timeout_secs = 5;
    settings.served.shutdown_timeout_secs = 5;
    settings
}

fn served_spec(server: ServedPort) -> BackendSpec {
    BackendSpec::Served {
        server,
        model_dir: "models/bert".into(),
        pooling: PoolingStrategy::ReduceMean,
        layers: Default::default(),
    }
}

#[test]
fn self_managed_session_starts_and_stops_once() {
    let counters = Arc::new(Counters::default());
    let launcher = FakeLauncher { counters: counters.clone() };
    let settings = test_settings();

    let mut session = BackendSession::open_with(served_spec(ServedPort::SelfManaged), &settings, &launcher).unwrap();
    assert_eq!(session.state(), SessionState::BackendReady);
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);

    let input = "a man plays\ta guitar\n\nfoo\tbar baz\n";
    let mut out = Vec::new();
    let stats = session
        .run(|embedder| Ok(run_streaming(input.as_bytes(), &mut out, embedder, Tokenization::Whitespace)?))
        .unwrap();
    assert_eq!(session.state(), SessionState::Flushed);
    assert_eq!((stats.records, stats.skipped), (2, 1));

    let text = String::from_utf8(out).unwrap();
    let first = parse_vector_line(text.lines().next().unwrap(), 1).unwrap();
    assert_eq!(first.vector1, vec![3.0, 11.0]);
    assert_eq!(first.vector2, vec![2.0, 8.0]);
    assert_eq!(counters.tokenized_requests.load(Ordering::SeqCst), 2);

    session.close().unwrap();
    assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_session_still_stops_server() {
    let counters = Arc::new(Counters::default());
    let launcher = FakeLauncher { counters: counters.clone() };
    let settings = test_settings();
    {
        let mut session = BackendSession::open_with(served_spec(ServedPort::SelfManaged), &settings, &launcher).unwrap();
        let failed = session.run(|_| -> anyhow::Result<()> { anyhow::bail!("pipeline failed") });
        assert!(failed.is_err());
        assert_eq!(session.state(), SessionState::Streaming);
    }
    assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn external_session_talks_to_named_port_and_never_launches() {
    let counters = Arc::new(Counters::default());
    let launcher = FakeLauncher { counters: counters.clone() };
    let settings = test_settings();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let named = listener.local_addr().unwrap().port();
    assert_ne!(named, settings.served.http_port);
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_encode_server(listener, stop.clone(), Arc::new(AtomicUsize::new(0)));

    let session = BackendSession::open_with(served_spec(ServedPort::External(named)), &settings, &launcher).unwrap();
    let vectors = session.embedder().embed_batch(&[Tokenization::Raw.apply("one two")]).unwrap();
    assert_eq!(vectors, vec![vec![2.0, 7.0]]);
    session.close().unwrap();
    assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    assert_eq!(counters.stops.load(Ordering::SeqCst), 0);

    stop.store(true, Ordering::SeqCst);
    let _ = TcpStream::connect(("127.0.0.1", named));
    handle.join().unwrap();
}

#[test]
fn self_managed_start_refuses_occupied_http_port() {
    let settings = test_settings();
    let _stale = TcpListener::bind(("127.0.0.1", settings.served.http_port)).unwrap();
    let launcher = CountingCrashLauncher::default();
    let err = BackendSession::open_with(served_spec(ServedPort::SelfManaged), &settings, &launcher).err().unwrap();
    assert!(matches!(err.downcast_ref::<sentvec_core::Error>(), Some(sentvec_core::Error::PortInUse(_))));
    assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
}

#[test]
fn server_exit_during_startup_is_fatal() {
    let settings = test_settings();
    let err = BackendSession::open_with(served_spec(ServedPort::SelfManaged), &settings, &CrashingLauncher).err().unwrap();
    assert!(matches!(err.downcast_ref::<sentvec_core::Error>(), Some(sentvec_core::Error::ServerExited(_))));
}

#[test]
fn served_client_rejects_short_result() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_request(&mut stream);
        respond(&mut stream, "200 OK", r#"{"id":1,"result":[[1.0]],"status":200}"#);
    });
    let client = ServedClient::connect(&Endpoint::new("127.0.0.1", 5555, port), Duration::from_secs(5)).unwrap();
    let err = client.embed_batch(&[Tokenization::Raw.apply("a"), Tokenization::Raw.apply("b")]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<sentvec_core::Error>(),
        Some(sentvec_core::Error::BatchSize { expected: 2, actual: 1 })
    ));
    handle.join().unwrap();
}

#[test]
fn hosted_encoder_orders_by_index() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let (path, body) = read_request(&mut stream).unwrap();
        assert_eq!(path, "/v1/embeddings");
        assert_eq!(body["model"], "use-large");
        assert_eq!(body["input"], serde_json::json!(["first", "second"]));
        let reply = r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#;
        respond(&mut stream, "200 OK", reply);
    });
    let encoder = HostedEncoder::new(&format!("http://127.0.0.1:{port}/v1/"), "use-large", None, Duration::from_secs(5)).unwrap();
    let out = encoder.embed_batch(&[Tokenization::Raw.apply("first"), Tokenization::Raw.apply("second")]).unwrap();
    assert_eq!(out, vec![vec![1.0], vec![2.0]]);
    handle.join().unwrap();
}

#[test]
fn hosted_encoder_surfaces_http_errors() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let _ = read_request(&mut stream);
        respond(&mut stream, "500 Internal Server Error", r#"{"error":"boom"}"#);
    });
    let encoder = HostedEncoder::new(&format!("http://127.0.0.1:{port}"), "m", Some("key"), Duration::from_secs(5)).unwrap();
    let err = encoder.embed_batch(&[Tokenization::Raw.apply("x")]).unwrap_err();
    assert!(err.to_string().contains("500"));
    handle.join().unwrap();
}
