use clap::Parser;
use merz::{Arity, CommandError, Server, ServerConfig, User, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// A small in-memory key-value server built on the merz framework.
#[derive(Parser, Debug)]
#[command(name = "merz", version, about = "RESP2/RESP3 key-value demo server")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// PEM certificate chain (enables TLS together with --key)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Require AUTH with this password for the "default" user
    #[arg(long)]
    password: Option<String>,
}

type Db = HashMap<String, Value>;

#[tokio::main]
async fn main() -> merz::ServerResult<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = ServerConfig {
        address: args.address,
        port: args.port,
        tls: None,
    };
    if let (Some(cert), Some(key)) = (&args.cert, &args.key) {
        config.tls = Some(merz::load_tls_config(cert, key)?);
    }

    let mut server = Server::bind(config, Db::new()).await?;

    if let Some(password) = args.password {
        server.add_user(User::new("default", password));
    }

    server.register("get", Arity::Exact(1), |conn, args, db| {
        let value = db.get(&args[0].to_text()).cloned().unwrap_or(Value::Nil);
        conn.write_value(&value)?;
        Ok(())
    });

    server.register("set", Arity::Exact(2), |conn, args, db| {
        db.insert(args[0].to_text(), args[1].clone());
        conn.write_ok()?;
        Ok(())
    });

    server.register("del", Arity::Variadic, |conn, args, db| {
        if args.is_empty() {
            return Err(CommandError::NotEnoughArguments);
        }

        for key in args {
            db.remove(&key.to_text());
        }

        // A single-key delete answers OK; multi-key deletes report how
        // many keys were named, whether or not they existed.
        if args.len() == 1 {
            conn.write_ok()?;
        } else {
            conn.write_value(&Value::from(args.len() as i64))?;
        }
        Ok(())
    });

    info!("commands: {:?}", server.command_names());

    server.run().await
}
