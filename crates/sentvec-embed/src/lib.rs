pub mod device;
pub mod fake;
pub mod local;
pub mod pool;
pub mod tokenize;
pub mod wordpiece;

pub use device::DevicePreference;
pub use fake::HashingEmbedder;
pub use local::{LocalBertEmbedder, LocalOptions};
pub use wordpiece::WordPieceTokenizer;
