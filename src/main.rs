//! The `lc3-vm` command-line binary: load one object image and run it
//! against the host terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use lc3_vm::loader::Image;
use lc3_vm::sim::io::{restore_terminal, RawMode, TerminalIO};
use lc3_vm::sim::Simulator;

#[derive(Parser, Debug)]
#[command(name = "lc3-vm", version)]
#[command(about = "Run an LC-3 object image (big-endian origin + payload)")]
struct Args {
    /// Path to the object image
    image: PathBuf,
}

/// SIGINT: put the terminal back, then leave with the conventional -2.
///
/// The handler touches no VM state; it only restores the terminal mode
/// saved before the run and terminates the process.
extern "C" fn handle_interrupt(_sig: libc::c_int) {
    restore_terminal();
    // SAFETY: write(2) is async-signal-safe; this pushes the cursor off the
    // interrupted program's output line.
    unsafe { libc::write(libc::STDOUT_FILENO, "\n".as_ptr().cast(), 1) };
    std::process::exit(-2);
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let image = match Image::read_from(&args.image) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("lc3-vm: {e}");
            return ExitCode::from(1);
        }
    };

    // Keep the guard alive for the whole run; returning (rather than
    // exiting) from this scope is what restores the terminal.
    let raw = RawMode::enable().ok();
    if raw.is_none() {
        debug!("stdin is not a terminal; running without raw mode");
    }

    // SAFETY: the handler only calls async-signal-safe functions and reads
    // terminal state that is written once, before this registration.
    unsafe {
        libc::signal(libc::SIGINT, handle_interrupt as libc::sighandler_t);
    }

    let mut sim = Simulator::new();
    sim.load_image(&image);
    sim.open_io(TerminalIO::new());

    match sim.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            drop(raw);
            eprintln!("lc3-vm: {e}");
            ExitCode::from(1)
        }
    }
}
