//! The command server: accept loop, handshake, authorization, dispatch.

pub mod connection;
pub mod registry;
pub mod tls;

pub use connection::Connection;
pub use registry::{Arity, BoundHandler, CommandError, CommandRegistry, CommandResult, DirectHandler};
pub use tls::load_tls_config;

use crate::protocol::ProtocolVersion;
use crate::user::User;
use crate::value::Value;
use connection::Transport;
use registry::CommandEntry;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio_rustls::{rustls, TlsAcceptor};
use tracing::{debug, info};

/// Name reported in the HELLO handshake map.
pub const SERVER_NAME: &str = "merz";

/// Framework protocol revision reported in the HELLO handshake map.
pub const SERVER_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Listen address and TLS material for a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub address: String,
    /// Port (0 picks an ephemeral port)
    pub port: u16,
    /// TLS configuration; plain TCP when absent
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 6379,
            tls: None,
        }
    }
}

/// A command server over an application context `C`.
///
/// Commands and users are configured before [`run`](Server::run) and frozen
/// afterwards; lookups during dispatch take no locks. The context is shared
/// by all bound handlers and serialized by a single mutex, so it appears
/// single-threaded to them.
pub struct Server<C> {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    registry: CommandRegistry<C>,
    users: HashMap<String, User>,
    context: Arc<Mutex<C>>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

/// Stops a running server's accept loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<C: Send + 'static> Server<C> {
    /// Bind the listener and wrap `context` for command handlers.
    pub async fn bind(config: ServerConfig, context: C) -> ServerResult<Server<C>> {
        let addr = format!("{}:{}", config.address, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            tls: config.tls.map(TlsAcceptor::from),
            registry: CommandRegistry::new(),
            users: HashMap::new(),
            context: Arc::new(Mutex::new(context)),
            shutdown: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Register a context-bound command; invocations serialize on the
    /// context mutex. A registration may shadow a built-in name.
    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, handler: F)
    where
        F: Fn(&mut Connection, &[Value], &mut C) -> CommandResult + Send + Sync + 'static,
    {
        self.registry.register(name, arity, handler);
    }

    /// Register a command that manages its own state and synchronization.
    pub fn register_direct<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Connection, &[Value]) -> CommandResult + Send + Sync + 'static,
    {
        self.registry.register_direct(name, handler);
    }

    /// Require authentication as `user` for this server. With no users
    /// installed, any AUTH succeeds and none is required.
    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.name.clone(), user);
    }

    /// Registered command names (built-ins not included), in no particular
    /// order.
    pub fn command_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Accept connections until shut down, spawning one task per connection.
    pub async fn run(self) -> ServerResult<()> {
        let Server {
            listener,
            tls,
            registry,
            users,
            context,
            shutdown,
            closed,
        } = self;

        let shared = Arc::new(Shared { registry, users, context });

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) if closed.load(Ordering::SeqCst) => {
                            debug!("accept after shutdown: {}", e);
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    };
                    debug!("connection from {}", peer);

                    let shared = Arc::clone(&shared);
                    let tls = tls.clone();
                    tokio::spawn(async move {
                        serve_connection(shared, tls, socket, peer).await;
                    });
                }
            }
        }
    }
}

struct Shared<C> {
    registry: CommandRegistry<C>,
    users: HashMap<String, User>,
    context: Arc<Mutex<C>>,
}

async fn serve_connection<C: Send + 'static>(
    shared: Arc<Shared<C>>,
    tls: Option<TlsAcceptor>,
    socket: TcpStream,
    peer: SocketAddr,
) {
    let stream: Box<dyn Transport> = match tls {
        Some(acceptor) => match acceptor.accept(socket).await {
            Ok(stream) => Box::new(stream),
            Err(e) => {
                debug!("TLS handshake with {} failed: {}", peer, e);
                return;
            }
        },
        None => Box::new(socket),
    };

    let mut conn = Connection::new(stream);
    if let Err(e) = handle_client(&shared, &mut conn).await {
        debug!("connection {} closed: {}", peer, e);
    } else {
        debug!("connection {} closed", peer);
    }
}

/// Handshake and command loop for one connection.
async fn handle_client<C: Send>(shared: &Shared<C>, conn: &mut Connection) -> io::Result<()> {
    loop {
        let message = match conn.read_message().await {
            Ok(Some(message)) => message,
            // Clean EOF.
            Ok(None) => return Ok(()),
            // Transport or framing failure: terminate without a reply.
            Err(e) => {
                debug!("terminating connection: {}", e);
                return Ok(());
            }
        };

        let mut args = message.value.to_array();
        if args.is_empty() {
            return Ok(());
        }

        let command = args.remove(0).to_text().to_lowercase();

        if let Some(user) = &conn.user {
            if !user.can(&command) {
                conn.write_error("invalid permissions")?;
                conn.flush().await?;
                continue;
            }
        }

        match shared.registry.get(&command) {
            Some(entry) => dispatch(shared, conn, entry, &args).await?,
            None => match command.as_str() {
                "hello" => handle_hello(shared, conn, &args)?,
                "auth" => handle_auth(shared, conn, &args)?,
                "command" => list_commands(shared, conn)?,
                "ping" => handle_ping(conn, &args)?,
                _ => conn.write_error("invalid command")?,
            },
        }

        conn.flush().await?;
    }
}

async fn dispatch<C>(
    shared: &Shared<C>,
    conn: &mut Connection,
    entry: &CommandEntry<C>,
    args: &[Value],
) -> io::Result<()> {
    if !check_user(&shared.users, conn.user.as_mut()) {
        return conn.write_error("auth failed");
    }

    let result = match entry {
        CommandEntry::Direct(handler) => handler(conn, args),
        CommandEntry::Bound { arity, handler } => match arity {
            Arity::Exact(expected) if *expected != args.len() => {
                return conn.write_error(&format!(
                    "invalid argument count, expected {} but got {}",
                    expected,
                    args.len()
                ));
            }
            _ => {
                let mut context = shared.context.lock().await;
                handler(conn, args, &mut context)
            }
        },
    };

    if let Err(e) = result {
        // Drop any partial reply the handler framed before failing.
        conn.reset_output();
        conn.write_error(&e.to_string())?;
    }

    Ok(())
}

/// Accepts when no users are installed, or when the connection's
/// credentials match a known user. On success the stored permissions are
/// copied onto the connection's user.
fn check_user(users: &HashMap<String, User>, candidate: Option<&mut User>) -> bool {
    if users.is_empty() {
        return true;
    }

    let Some(candidate) = candidate else {
        return false;
    };
    let Some(known) = users.get(&candidate.name) else {
        return false;
    };

    if known.password_matches(&candidate.password) {
        candidate.permissions = known.permissions.clone();
        return true;
    }

    false
}

/// `HELLO <proto> [AUTH <name> <password>]`
fn handle_hello<C>(shared: &Shared<C>, conn: &mut Connection, args: &[Value]) -> io::Result<()> {
    if args.is_empty() {
        return conn.write_error("malformed HELLO command");
    }

    let Some(version) = ProtocolVersion::from_token(&args[0].to_text()) else {
        return conn.write_value(&Value::error_raw("NOPROTO this protocol is not supported"));
    };
    conn.set_version(version);

    let credentials = if args.len() >= 4 && args[1].to_text().eq_ignore_ascii_case("auth") {
        Some(User::new(args[2].to_text(), args[3].to_text()))
    } else if args.len() >= 3 {
        // Keyword-less legacy form: HELLO <proto> <name> <password>.
        Some(User::new(args[1].to_text(), args[2].to_text()))
    } else {
        None
    };

    if let Some(user) = credentials {
        conn.user = Some(user);
        if !check_user(&shared.users, conn.user.as_mut()) {
            return conn.write_error("auth failed");
        }
    }

    conn.write_value(&Value::map([
        ("server", Value::from(SERVER_NAME)),
        ("version", Value::from(SERVER_VERSION)),
        ("proto", Value::from(3i64)),
    ]))
}

/// `AUTH [name] <password>`
fn handle_auth<C>(shared: &Shared<C>, conn: &mut Connection, args: &[Value]) -> io::Result<()> {
    match args {
        [] => return conn.write_error("not enough arguments"),
        [password] => conn.user = Some(User::new("default", password.to_text())),
        [name, password, ..] => {
            conn.user = Some(User::new(name.to_text(), password.to_text()));
        }
    }

    if !check_user(&shared.users, conn.user.as_mut()) {
        return conn.write_error("auth failed");
    }

    conn.write_ok()
}

/// `COMMAND`: the registered names as an array.
fn list_commands<C>(shared: &Shared<C>, conn: &mut Connection) -> io::Result<()> {
    if !check_user(&shared.users, conn.user.as_mut()) {
        return conn.write_error("auth failed");
    }

    conn.write_value(&Value::array(shared.registry.names()))
}

/// `PING [msg]`: echo `msg`, default `PONG`.
fn handle_ping(conn: &mut Connection, args: &[Value]) -> io::Result<()> {
    match args.first() {
        Some(msg) => conn.write_simple_string(&msg.to_text()),
        None => conn.write_simple_string("PONG"),
    }
}
