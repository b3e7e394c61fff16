//! ringpoll echo server
//!
//! Binds a listener, accepts every pending connection and writes back
//! whatever each client sends. Output that the socket cannot take right away
//! stays in the connection's output buffer until the next writable event.

use anyhow::Context;
use ringpoll::server::{handler, Handler, ServerConfig, ServerContext, Source};
use ringpoll::{ConnectionId, EventMask};
use std::io;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Watched while there is nothing to send
const IDLE: EventMask =
    EventMask::from_bits(EventMask::READABLE.bits() | EventMask::HANGUP.bits());

/// Command-line configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Server limits and buffer sizes
    server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: ringpoll::DEFAULT_HOST.to_string(),
            port: ringpoll::DEFAULT_PORT,
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("ringpoll version {}", ringpoll::VERSION);
                    std::process::exit(0);
                }
                "--host" | "-h" | "--port" | "-p" | "--max-clients" | "--buffer-size"
                | "--timeout-ms" => {
                    let Some(value) = args.get(i + 1) else {
                        eprintln!("Error: {flag} requires a value");
                        std::process::exit(1);
                    };
                    config.apply(flag, value);
                    i += 2;
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn apply(&mut self, flag: &str, value: &str) {
        match flag {
            "--host" | "-h" => self.host = value.to_string(),
            "--port" | "-p" => self.port = parse_or_exit(flag, value),
            "--max-clients" => {
                let max_clients: usize = parse_or_exit(flag, value);
                self.server.max_clients = max_clients;
                // Backlog follows the client limit, as in the default config
                self.server.backlog = i32::try_from(max_clients).unwrap_or(i32::MAX);
            }
            "--buffer-size" => {
                let size: usize = parse_or_exit(flag, value);
                if !size.is_power_of_two() {
                    eprintln!("Error: --buffer-size must be a power of two");
                    std::process::exit(1);
                }
                self.server.buffer_size = size;
            }
            "--timeout-ms" => {
                let ms: u64 = parse_or_exit(flag, value);
                self.server.poll_timeout = Some(Duration::from_millis(ms));
            }
            _ => unreachable!("flag filtered by from_args"),
        }
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or_exit<T: std::str::FromStr>(flag: &str, value: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {flag}: {value}");
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
ringpoll - Single-threaded poll(2) TCP echo server

USAGE:
    ringpoll [OPTIONS]

OPTIONS:
    -h, --host <HOST>          IPv4 address to bind to (default: 0.0.0.0)
    -p, --port <PORT>          Port to listen on (default: 9000)
        --max-clients <N>      Watched descriptors, listener included (default: 1024)
        --buffer-size <BYTES>  Initial per-connection buffer size, a power of two (default: 1024)
        --timeout-ms <MS>      Poll timeout in milliseconds (default: wait indefinitely)
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    ringpoll                          # Echo on 0.0.0.0:9000
    ringpoll --host 127.0.0.1 -p 7    # Loopback only, port 7
    RUST_LOG=debug ringpoll           # Log every connect and disconnect

CONNECTING:
    $ nc 127.0.0.1 9000
"#
    );
}

/// Echoes input back and stops watching for writability once the output
/// buffer is empty.
fn echo_handler() -> Handler<()> {
    handler(|server, source, events, _: &mut ()| {
        let Source::Connection(id) = source else {
            return;
        };

        if events.is_error() {
            warn!(id = %id, "Socket error");
            server.disconnect(id);
            return;
        }

        if let Err(e) = echo(server, id, events) {
            debug!(id = %id, error = %e, "Closing connection");
            server.disconnect(id);
        }
    })
}

fn echo(server: &mut ServerContext<()>, id: ConnectionId, events: EventMask) -> io::Result<()> {
    let Some(conn) = server.connection_mut(id) else {
        return Ok(());
    };

    if events.is_readable() || events.is_hangup() {
        match conn.receive() {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(_) => {
                let bytes = conn.input_mut().take(usize::MAX);
                conn.send(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
    }

    if !conn.output().is_empty() {
        conn.flush()?;
    }

    let interest = if conn.output().is_empty() {
        IDLE
    } else {
        IDLE | EventMask::WRITABLE
    };
    server
        .set_interest(id, interest)
        .map_err(io::Error::other)
}

/// Accepts every pending connection.
fn listener_handler(on_connection: Handler<()>) -> Handler<()> {
    handler(move |server, _, _, _: &mut ()| loop {
        match server.accept(Rc::clone(&on_connection)) {
            Ok(id) => {
                if let Err(e) = server.set_interest(id, IDLE) {
                    warn!(id = %id, error = %e, "Failed to set interest");
                }
            }
            // Backlog drained, or a failure accept already logged
            Err(_) => break,
        }
    })
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let address = config.bind_address();
    let mut server = ServerContext::bind_with_config(
        &address,
        listener_handler(echo_handler()),
        config.server,
    )
    .with_context(|| format!("failed to start server on {address}"))?;

    info!(
        "ringpoll v{} echo server ready on {}",
        ringpoll::VERSION,
        server.local_addr()
    );

    let result = server.run(&mut ());
    server.shutdown();
    result.context("event loop failed")?;

    info!("Server shutdown complete");
    Ok(())
}
