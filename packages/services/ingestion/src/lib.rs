pub mod cli;
pub mod clients;
pub mod config;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod schema;
pub mod server;
pub mod storage;

// Convenient re-exports for tests and external callers
pub use clients::*;
pub use config::*;
pub use handlers::*;
pub use models::*;
pub use pipeline::*;
pub use processing::*;
pub use server::*;
pub use storage::*;
