//! Starting, probing and stopping the embedding server.
//!
//! A port of `"0"` asks for a fresh server on the configured default port;
//! any other port names the HTTP front end of a server somebody else runs.
//! Either way the HTTP front end must accept a TCP connection before the
//! client is used.
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sentvec_core::config::ServedSettings;
use sentvec_core::{Error, PoolingLayers, PoolingStrategy};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedPort {
    SelfManaged,
    External(u16),
}

impl ServedPort {
    pub fn parse(raw: &str) -> sentvec_core::error::Result<Self> {
        let raw = raw.trim();
        if raw == "0" {
            return Ok(Self::SelfManaged);
        }
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidConfig(format!("port '{raw}' is not a number")));
        }
        match raw.parse::<u16>() {
            Ok(port) if port != 0 && port != u16::MAX => Ok(Self::External(port)),
            _ => Err(Error::InvalidConfig(format!("port '{raw}' is out of range"))),
        }
    }

    pub fn is_self_managed(&self) -> bool { matches!(self, Self::SelfManaged) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub port_out: u16,
    pub http_port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, http_port: u16) -> Self {
        Self { host: host.into(), port, port_out: port.saturating_add(1), http_port }
    }

    /// A server run by somebody else; the named port is its HTTP front end.
    pub fn external(host: impl Into<String>, port: u16) -> Self { Self::new(host, port, port) }

    pub fn http_addr(&self) -> String { format!("{}:{}", self.host, self.http_port) }

    pub fn base_url(&self) -> String { format!("http://{}", self.http_addr()) }

    fn all_addrs(&self) -> Vec<String> {
        [self.port, self.port_out, self.http_port]
            .iter()
            .map(|p| format!("{}:{}", self.host, p))
            .collect()
    }
}

/// Everything the server launcher is started with.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub program: String,
    pub terminate_program: Option<String>,
    pub model_dir: PathBuf,
    pub endpoint: Endpoint,
    pub pooling_strategy: PoolingStrategy,
    pub pooling_layers: PoolingLayers,
    pub max_seq_len: Option<String>,
    pub mask_cls_sep: bool,
    pub cpu: bool,
    pub num_worker: Option<u32>,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn from_settings(
        settings: &ServedSettings,
        model_dir: &Path,
        endpoint: Endpoint,
        pooling_strategy: PoolingStrategy,
        pooling_layers: PoolingLayers,
    ) -> Self {
        Self {
            program: settings.program.clone(),
            terminate_program: settings.terminate_program.clone().filter(|p| !p.trim().is_empty()),
            model_dir: model_dir.to_path_buf(),
            endpoint,
            pooling_strategy,
            pooling_layers,
            max_seq_len: settings.max_seq_len.clone(),
            mask_cls_sep: settings.mask_cls_sep,
            cpu: settings.cpu,
            num_worker: settings.num_worker,
            startup_timeout: Duration::from_secs(settings.startup_timeout_secs),
            shutdown_timeout: Duration::from_secs(settings.shutdown_timeout_secs),
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-model_dir".to_string(),
            self.model_dir.display().to_string(),
            "-port".to_string(),
            self.endpoint.port.to_string(),
            "-port_out".to_string(),
            self.endpoint.port_out.to_string(),
            "-http_port".to_string(),
            self.endpoint.http_port.to_string(),
            "-pooling_strategy".to_string(),
            self.pooling_strategy.to_string(),
            "-pooling_layer".to_string(),
        ];
        args.extend(self.pooling_layers.to_args());
        if let Some(len) = &self.max_seq_len {
            args.push("-max_seq_len".to_string());
            args.push(len.clone());
        }
        if self.mask_cls_sep { args.push("-mask_cls_sep".to_string()); }
        if self.cpu { args.push("-cpu".to_string()); }
        if let Some(n) = self.num_worker {
            args.push("-num_worker".to_string());
            args.push(n.to_string());
        }
        args
    }
}

pub trait ServerProcess: Send {
    /// `Some(description)` once the process is gone.
    fn exit_status(&mut self) -> Result<Option<String>>;
    fn stop(&mut self) -> Result<()>;
}

pub trait ServerLauncher {
    fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerProcess>>;
}

/// Spawns the real server program.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ServerLauncher for ProcessLauncher {
    fn launch(&self, config: &ServerConfig) -> Result<Box<dyn ServerProcess>> {
        let args = config.to_args();
        debug!(program = %config.program, args = ?args, "spawning embedding server");
        let child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {}", config.program))?;
        Ok(Box::new(ChildServer {
            child,
            terminate_program: config.terminate_program.clone(),
            port: config.endpoint.port,
            grace: config.shutdown_timeout,
        }))
    }
}

struct ChildServer {
    child: Child,
    terminate_program: Option<String>,
    port: u16,
    grace: Duration,
}

impl ChildServer {
    fn wait_for_exit(&mut self, limit: Duration) -> Result<bool> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() { return Ok(true); }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(false)
    }
}

impl ServerProcess for ChildServer {
    fn exit_status(&mut self) -> Result<Option<String>> {
        Ok(self.child.try_wait()?.map(|status| status.to_string()))
    }

    fn stop(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() { return Ok(()); }
        if let Some(program) = self.terminate_program.clone() {
            let asked = Command::new(&program)
                .arg("-port")
                .arg(self.port.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match asked {
                Ok(status) if status.success() => {
                    if self.wait_for_exit(self.grace)? { return Ok(()); }
                    warn!(pid = self.child.id(), "server ignored shutdown request, killing");
                }
                Ok(status) => warn!(%status, "{program} failed"),
                Err(e) => warn!(error = %e, "could not run {program}"),
            }
        }
        if self.child.try_wait()?.is_none() {
            self.child.kill().context("failed to kill embedding server")?;
        }
        self.child.wait().context("failed to reap embedding server")?;
        Ok(())
    }
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    Ok(addr.to_socket_addrs().with_context(|| format!("cannot resolve {addr}"))?.collect())
}

fn accepts(addrs: &[SocketAddr]) -> bool {
    addrs.iter().any(|a| TcpStream::connect_timeout(a, CONNECT_TIMEOUT).is_ok())
}

/// Blocks until `addr` accepts a TCP connection. With a `process`, fails as
/// soon as it exits.
pub fn wait_until_ready(addr: &str, mut process: Option<&mut dyn ServerProcess>, timeout: Duration) -> Result<()> {
    let addrs = resolve(addr)?;
    let start = Instant::now();
    loop {
        if accepts(&addrs) {
            info!(addr, elapsed_ms = start.elapsed().as_millis() as u64, "embedding server ready");
            return Ok(());
        }
        if let Some(p) = process.as_deref_mut() {
            if let Some(status) = p.exit_status()? {
                return Err(Error::ServerExited(status).into());
            }
        }
        if start.elapsed() >= timeout {
            return Err(Error::StartupTimeout { addr: addr.to_string(), timeout }.into());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Blocks until none of `addrs` accepts connections any more.
pub fn wait_until_released(addrs: &[String], timeout: Duration) -> Result<()> {
    let mut resolved = Vec::new();
    for addr in addrs { resolved.extend(resolve(addr)?); }
    let start = Instant::now();
    while accepts(&resolved) {
        if start.elapsed() >= timeout {
            anyhow::bail!("ports {} still in use after {:?}", addrs.join(", "), timeout);
        }
        thread::sleep(POLL_INTERVAL);
    }
    Ok(())
}

/// Fails if anything already listens on one of the endpoint's ports. A stale
/// server there would otherwise pass the readiness check in our place.
pub fn ensure_ports_free(endpoint: &Endpoint) -> Result<()> {
    for addr in endpoint.all_addrs() {
        if accepts(&resolve(&addr)?) {
            return Err(Error::PortInUse(addr).into());
        }
    }
    Ok(())
}

/// Owns a server started by us; the server goes away with the guard.
pub struct ServerGuard {
    process: Option<Box<dyn ServerProcess>>,
    endpoint: Endpoint,
    shutdown_timeout: Duration,
}

impl ServerGuard {
    pub fn start(launcher: &dyn ServerLauncher, config: &ServerConfig) -> Result<Self> {
        info!(model_dir = %config.model_dir.display(), port = config.endpoint.port, http_port = config.endpoint.http_port, "starting embedding server");
        ensure_ports_free(&config.endpoint)?;
        let mut process = launcher.launch(config)?;
        if let Err(e) = wait_until_ready(&config.endpoint.http_addr(), Some(process.as_mut()), config.startup_timeout) {
            if let Err(stop_err) = process.stop() {
                warn!(error = %stop_err, "failed to stop server after failed start");
            }
            return Err(e);
        }
        Ok(Self { process: Some(process), endpoint: config.endpoint.clone(), shutdown_timeout: config.shutdown_timeout })
    }

    pub fn endpoint(&self) -> &Endpoint { &self.endpoint }

    /// Stops the server and waits until its ports can be bound again.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()?;
        wait_until_released(&self.endpoint.all_addrs(), self.shutdown_timeout)
    }

    /// The process stays owned until `stop` succeeds so a failed stop can be retried.
    fn shutdown(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            process.stop()?;
            self.process = None;
            info!(port = self.endpoint.port, "embedding server stopped");
        }
        Ok(())
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "failed to stop embedding server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_parsing() {
        assert_eq!(ServedPort::parse("0").unwrap(), ServedPort::SelfManaged);
        assert_eq!(ServedPort::parse(" 5555 ").unwrap(), ServedPort::External(5555));
        assert!(ServedPort::parse("-1").is_err());
        assert!(ServedPort::parse("abc").is_err());
        assert!(ServedPort::parse("70000").is_err());
        assert!(ServedPort::parse("").is_err());
    }

    #[test]
    fn endpoint_derives_port_out() {
        let ep = Endpoint::new("127.0.0.1", 5555, 8125);
        assert_eq!(ep.port_out, 5556);
        assert_eq!(ep.base_url(), "http://127.0.0.1:8125");
    }

    #[test]
    fn renders_server_arguments() {
        let settings = ServedSettings { max_seq_len: Some("NONE".into()), mask_cls_sep: true, num_worker: Some(2), ..Default::default() };
        let config = ServerConfig::from_settings(
            &settings,
            Path::new("/models/bert"),
            Endpoint::new("127.0.0.1", 5555, 8125),
            PoolingStrategy::ReduceMax,
            "-4,-1".parse().unwrap(),
        );
        assert_eq!(
            config.to_args().join(" "),
            "-model_dir /models/bert -port 5555 -port_out 5556 -http_port 8125 \
             -pooling_strategy REDUCE_MAX -pooling_layer -4 -1 -max_seq_len NONE -mask_cls_sep -cpu -num_worker 2"
        );
    }

    #[test]
    fn external_endpoint_uses_named_port_for_http() {
        let ep = Endpoint::external("127.0.0.1", 6000);
        assert_eq!(ep.http_addr(), "127.0.0.1:6000");
    }

    #[test]
    fn occupied_port_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = listener.local_addr().unwrap().port();
        let err = ensure_ports_free(&Endpoint::new("127.0.0.1", 1, busy)).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::PortInUse(addr)) if addr.ends_with(&busy.to_string())));
    }

    struct Stubborn { attempts: usize }

    impl ServerProcess for Stubborn {
        fn exit_status(&mut self) -> Result<Option<String>> { Ok(None) }
        fn stop(&mut self) -> Result<()> {
            self.attempts += 1;
            if self.attempts == 1 { anyhow::bail!("kill failed"); }
            Ok(())
        }
    }

    #[test]
    fn failed_stop_keeps_process_for_retry() {
        let mut guard = ServerGuard {
            process: Some(Box::new(Stubborn { attempts: 0 })),
            endpoint: Endpoint::new("127.0.0.1", 1, 2),
            shutdown_timeout: Duration::from_millis(10),
        };
        assert!(guard.shutdown().is_err());
        assert!(guard.process.is_some());
        guard.shutdown().unwrap();
        assert!(guard.process.is_none());
    }

    #[test]
    fn readiness_times_out_on_closed_port() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = wait_until_ready(&format!("127.0.0.1:{port}"), None, Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::StartupTimeout { .. })));
    }
}
