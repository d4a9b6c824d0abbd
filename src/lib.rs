//! merz, a RESP2/RESP3 command-server framework.
//!
//! An application registers named commands against a context value and
//! exposes them as a command-oriented TCP service, with optional
//! authentication and TLS. Any Redis-protocol client can talk to it:
//! connections start in the RESP2 dialect and upgrade to RESP3 with
//! `HELLO 3`.
//!
//! # Example
//!
//! ```no_run
//! use merz::{Arity, Server, ServerConfig, Value};
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> merz::ServerResult<()> {
//!     let db: HashMap<String, Value> = HashMap::new();
//!     let mut server = Server::bind(ServerConfig::default(), db).await?;
//!
//!     server.register("get", Arity::Exact(1), |conn, args, db| {
//!         let value = db.get(&args[0].to_text()).cloned().unwrap_or(Value::Nil);
//!         conn.write_value(&value)?;
//!         Ok(())
//!     });
//!
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod protocol;
pub mod server;
pub mod user;
pub mod value;

// Re-export the working surface.
pub use client::Client;
pub use protocol::{Message, MessageKind, ProtocolError, ProtocolResult, ProtocolVersion};
pub use server::{
    load_tls_config, Arity, CommandError, CommandRegistry, CommandResult, Connection, Server,
    ServerConfig, ServerError, ServerResult, ShutdownHandle,
};
pub use user::User;
pub use value::{Kind, Value};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
