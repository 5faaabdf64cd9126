pub mod hosted;
pub mod lifecycle;
pub mod served;
pub mod session;

pub use hosted::HostedEncoder;
pub use lifecycle::{Endpoint, ProcessLauncher, ServedPort, ServerConfig, ServerGuard, ServerLauncher, ServerProcess};
pub use served::ServedClient;
pub use session::{BackendSession, BackendSpec};
