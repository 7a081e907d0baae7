//! pipesig - run a command with its stdio proxied through private pipes
//!
//! This is the main entry point. It wires together:
//! - Command-line parsing and logging
//! - Channel allocation and the signal gate
//! - Child launch
//! - The proxy loop and the shutdown sequence

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use pipesig_core::{shutdown, Endpoints, ProxyLoop};
use pipesig_host_api::{exit_code_of, ChildControl};
use pipesig_host_linux::{ChannelPair, LinuxChild, SignalGate};
use pipesig_util::{DEFAULT_RELAY_CAPACITY, FAILURE_STATUS};
use std::fs::File;
use std::os::fd::AsFd;
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// pipesig - Proxy a child's stdin/stdout and enforce its lifecycle
#[derive(Parser, Debug)]
#[command(name = "pipesig", version)]
#[command(about = "Proxy a child's stdin/stdout through private pipes and reap it reliably", long_about = None)]
struct Args {
    /// Log level (logs always go to stderr)
    #[arg(short, long, env = "PIPESIG_LOG", default_value = "warn")]
    log_level: String,

    /// Relay buffer size in bytes
    #[arg(short, long, env = "PIPESIG_BUFFER_SIZE", default_value_t = DEFAULT_RELAY_CAPACITY, value_parser = parse_buffer_size)]
    buffer_size: usize,

    /// How long to wait for the child to exit once relaying stops, in milliseconds
    #[arg(short = 'g', long, env = "PIPESIG_TERM_GRACE_MS", default_value_t = 1000)]
    term_grace_ms: u64,

    /// Command to run, followed by its arguments
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn parse_buffer_size(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("buffer size must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Duplicate one of our standard streams as an owned, close-on-exec file
fn dup_stdio(fd: impl AsFd, name: &str) -> Result<File> {
    let owned = fd
        .as_fd()
        .try_clone_to_owned()
        .with_context(|| format!("Failed to duplicate {}", name))?;
    Ok(File::from(owned))
}

fn run(args: &Args) -> Result<i32> {
    let channels = ChannelPair::allocate().context("Failed to allocate channels")?;
    let gate = SignalGate::arm().context("Failed to arm signal gate")?;

    let controller_in = dup_stdio(std::io::stdin(), "stdin")?;
    let controller_out = dup_stdio(std::io::stdout(), "stdout")?;

    let (parent, child_ends) = channels.split();
    let mut child = LinuxChild::launch(&args.command, child_ends, gate.original_mask())
        .with_context(|| format!("Failed to launch {}", args.command[0]))?;

    info!(pid = child.pid(), command = ?args.command, "Child launched");

    let mut proxy = ProxyLoop::new(
        Endpoints {
            controller_in,
            controller_out,
            child_in: parent.to_child,
            child_out: parent.from_child,
        },
        args.buffer_size,
    );

    let reason = match proxy.run(&gate) {
        Ok(reason) => reason,
        Err(e) => {
            if let Err(kill_err) = child.kill() {
                warn!(error = %kill_err, "Failed to kill child after relay failure");
            }
            return Err(e).context("Relay failed");
        }
    };

    let grace = Duration::from_millis(args.term_grace_ms);
    let status = shutdown(&mut proxy, &mut child, &gate, reason, grace);
    Ok(exit_code_of(status))
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.exit();
            }
            let _ = e.print();
            process::exit(FAILURE_STATUS);
        }
    };

    // Initialize logging; stdout carries proxied bytes only
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "pipesig starting");

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "pipesig failed");
            FAILURE_STATUS
        }
    };

    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_its_flags_are_kept_verbatim() {
        let args = Args::try_parse_from(["pipesig", "grep", "-v", "--color", "x"]).unwrap();
        assert_eq!(args.command, vec!["grep", "-v", "--color", "x"]);
        assert_eq!(args.buffer_size, DEFAULT_RELAY_CAPACITY);
    }

    #[test]
    fn own_options_precede_the_command() {
        let args =
            Args::try_parse_from(["pipesig", "--buffer-size", "16", "-g", "0", "cat"]).unwrap();
        assert_eq!(args.buffer_size, 16);
        assert_eq!(args.term_grace_ms, 0);
        assert_eq!(args.command, vec!["cat"]);
    }

    #[test]
    fn missing_command_is_a_usage_error() {
        let err = Args::try_parse_from(["pipesig"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        assert!(Args::try_parse_from(["pipesig", "-b", "0", "cat"]).is_err());
    }
}
