//! Command-line surface: one `serve` subcommand, each flag with an
//! environment-variable fallback at lower precedence.

use clap::{Args, Parser, Subcommand};

use crate::transport;

#[derive(Debug, Parser)]
#[command(name = "granville", about = "Local inference kernel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load one or more models and start serving requests.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Model specs: `path` | `type:path` | `type:id:path`.
    pub models: Vec<String>,

    #[arg(short, long, env = "GRANVILLE_SOCKET", default_value_t = default_socket())]
    pub socket: String,

    #[arg(short, long, env = "GRANVILLE_QUEUE_SIZE", default_value_t = crate::queue::ranked::DEFAULT_MAX_SIZE)]
    pub queue_size: usize,

    #[arg(short, long, env = "GRANVILLE_WORKERS")]
    pub workers: Option<usize>,

    #[arg(short, long, env = "GRANVILLE_DRIVER", default_value = "stub")]
    pub driver: String,

    /// Reserved for a future status endpoint; accepted but unused by the
    /// core task-lifecycle engine.
    #[arg(short, long, env = "GRANVILLE_PORT")]
    pub port: Option<u16>,
}

fn default_socket() -> String {
    if cfg!(windows) {
        transport::DEFAULT_NAMED_PIPE_NAME.to_string()
    } else {
        transport::DEFAULT_UNIX_SOCKET_PATH.to_string()
    }
}
