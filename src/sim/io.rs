//! Host IO for the LC-3 virtual machine.
//!
//! The interface for host IO is defined with the [`IODevice`] trait, which
//! captures the three primitives the execution core needs from its host:
//! a zero-wait keyboard poll, a blocking keyboard read, and a flushed byte
//! write. This is exposed to the simulator with the [`SimIO`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`EmptyIO`]: an `IODevice` holding the implementation for a lack of IO support.
//! - [`BufferedIO`]: an `IODevice` holding a buffered implementation for IO.
//! - [`TerminalIO`]: an `IODevice` bound to the host terminal's stdin/stdout.
//! - [`RawMode`]: a scoped guard over the terminal's non-canonical, no-echo mode.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;
use termios::{tcsetattr, Termios, ECHO, ICANON, TCSANOW};

/// A host IO device the machine can poll, read, and write.
pub trait IODevice {
    /// Polls the keyboard with zero wait, consuming and returning a byte
    /// if one is ready right now.
    fn poll_key(&mut self) -> Option<u8>;

    /// Reads one byte from the keyboard, blocking until one is available.
    fn read_key(&mut self) -> io::Result<u8>;

    /// Writes one byte to the host output and flushes it.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
}

/// No IO. Output is discarded; polls never see a key; a blocking read fails
/// rather than hanging forever.
pub struct EmptyIO;
impl IODevice for EmptyIO {
    fn poll_key(&mut self) -> Option<u8> {
        None
    }

    fn read_key(&mut self) -> io::Result<u8> {
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no input attached"))
    }

    fn write_byte(&mut self, _byte: u8) -> io::Result<()> {
        Ok(())
    }
}

/// IO that reads from an in-memory input queue and collects output.
///
/// Cloning yields another handle to the same queues, so a test can keep one
/// handle while the machine owns the other: the test side feeds keys in with
/// [`BufferedIO::push_input`] and inspects what the program wrote with
/// [`BufferedIO::output`]. This makes the device the harness for exercising
/// the interactive traps without a terminal.
#[derive(Clone, Default)]
pub struct BufferedIO {
    shared: Arc<Mutex<Buffers>>,
}

#[derive(Default)]
struct Buffers {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferedIO {
    /// Creates a device with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for the machine to read.
    pub fn push_input(&self, bytes: impl IntoIterator<Item = u8>) {
        self.lock().input.extend(bytes);
    }

    /// The number of input bytes queued but not yet consumed.
    pub fn pending_input(&self) -> usize {
        self.lock().input.len()
    }

    /// A copy of everything the machine has written so far.
    pub fn output(&self) -> Vec<u8> {
        self.lock().output.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        // A panic while the lock is held can only come from the other side
        // of the handle; the buffers themselves are still usable.
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
impl IODevice for BufferedIO {
    fn poll_key(&mut self) -> Option<u8> {
        self.lock().input.pop_front()
    }

    fn read_key(&mut self) -> io::Result<u8> {
        // A buffered device has nothing to block on. An empty queue is
        // the end of its input.
        self.lock()
            .input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "input queue exhausted"))
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.lock().output.push(byte);
        Ok(())
    }
}

/// IO bound to the host terminal.
///
/// Input runs through a reader thread feeding a bounded single-slot channel:
/// the thread blocks on raw stdin, so the machine side can poll with zero
/// wait (`try_recv`) or block (`recv`) without ever touching stdin itself.
/// Output is written straight to stdout and flushed, as the `OUT` trap
/// requires.
///
/// The terminal should be in non-canonical, no-echo mode while this device
/// is in use (see [`RawMode`]); otherwise bytes only arrive line-by-line.
pub struct TerminalIO {
    keys: cbc::Receiver<u8>,
    #[allow(unused)]
    read_handler: JoinHandle<()>,
}
impl TerminalIO {
    /// Creates a terminal device, spawning its stdin reader thread.
    ///
    /// The reader thread exits when stdin closes or when the receiving side
    /// is dropped; it is never joined, since it may be parked in a read.
    pub fn new() -> Self {
        let (key_tx, key_rx) = cbc::bounded(1);

        let read_handler = std::thread::spawn(move || loop {
            let mut buf = [0u8];
            let Ok(()) = io::stdin().lock().read_exact(&mut buf) else { return };
            let Ok(()) = key_tx.send(buf[0]) else { return };
        });

        Self { keys: key_rx, read_handler }
    }
}
impl Default for TerminalIO {
    fn default() -> Self {
        Self::new()
    }
}
impl IODevice for TerminalIO {
    fn poll_key(&mut self) -> Option<u8> {
        self.keys.try_recv().ok()
    }

    fn read_key(&mut self) -> io::Result<u8> {
        self.keys
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"))
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&[byte])?;
        stdout.flush()
    }
}

/// All the variants of IO accepted by the simulator.
#[derive(Default)]
pub enum SimIO {
    /// No IO. This corresponds to the implementation of [`EmptyIO`].
    #[default]
    Empty,
    /// A buffered implementation. See [`BufferedIO`].
    Buffered(BufferedIO),
    /// The host terminal. See [`TerminalIO`].
    Terminal(TerminalIO),
}
impl std::fmt::Debug for SimIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimIO").finish_non_exhaustive()
    }
}
impl From<EmptyIO> for SimIO {
    fn from(_value: EmptyIO) -> Self {
        SimIO::Empty
    }
}
impl From<BufferedIO> for SimIO {
    fn from(value: BufferedIO) -> Self {
        SimIO::Buffered(value)
    }
}
impl From<TerminalIO> for SimIO {
    fn from(value: TerminalIO) -> Self {
        SimIO::Terminal(value)
    }
}
impl IODevice for SimIO {
    fn poll_key(&mut self) -> Option<u8> {
        match self {
            SimIO::Empty => EmptyIO.poll_key(),
            SimIO::Buffered(io) => io.poll_key(),
            SimIO::Terminal(io) => io.poll_key(),
        }
    }

    fn read_key(&mut self) -> io::Result<u8> {
        match self {
            SimIO::Empty => EmptyIO.read_key(),
            SimIO::Buffered(io) => io.read_key(),
            SimIO::Terminal(io) => io.read_key(),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        match self {
            SimIO::Empty => EmptyIO.write_byte(byte),
            SimIO::Buffered(io) => io.write_byte(byte),
            SimIO::Terminal(io) => io.write_byte(byte),
        }
    }
}

/// The terminal attributes in effect before the first [`RawMode`] was entered.
///
/// Held process-wide so an asynchronous exit path (the SIGINT handler) can
/// restore the terminal without a reference to the guard.
static SAVED_TERMIOS: OnceLock<Termios> = OnceLock::new();

/// Restores the terminal attributes saved by [`RawMode::enable`], if any.
///
/// Safe to call from a signal handler: `tcsetattr` is async-signal-safe and
/// the saved attributes are written once, before any handler can run.
pub fn restore_terminal() {
    if let Some(prev) = SAVED_TERMIOS.get() {
        let _ = tcsetattr(libc::STDIN_FILENO, TCSANOW, prev);
    }
}

/// A scoped acquisition of the terminal in non-canonical, no-echo mode.
///
/// Dropping the guard restores the attributes that were in effect when it
/// was created, so every normal exit path puts the terminal back. The
/// SIGINT path uses [`restore_terminal`] instead.
pub struct RawMode {
    prev: Termios,
}
impl RawMode {
    /// Puts stdin into non-canonical, no-echo mode.
    pub fn enable() -> io::Result<Self> {
        let prev = Termios::from_fd(libc::STDIN_FILENO)?;
        let _ = SAVED_TERMIOS.set(prev);

        let mut raw = prev;
        raw.c_lflag &= !(ICANON | ECHO);
        tcsetattr(libc::STDIN_FILENO, TCSANOW, &raw)?;
        Ok(Self { prev })
    }
}
impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = tcsetattr(libc::STDIN_FILENO, TCSANOW, &self.prev);
    }
}
