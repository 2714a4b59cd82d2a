pub mod config;
pub mod error;
pub mod session;
pub mod store;

pub use error::{Result, SessionError, SessionKvError, StoreError};
pub use session::{KvSessionProvider, Record, Session, SessionExt, SessionProvider};
pub use store::BackingStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
