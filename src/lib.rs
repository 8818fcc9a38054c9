//! An LC-3 virtual machine.
//!
//! This crate loads a single LC-3 object image into a simulated 64K-word
//! memory and executes it: bit-exact instruction decoding, two's-complement
//! sign-extension, condition-flag tracking, trap service routines, and
//! memory-mapped keyboard polling.
//!
//! # Usage
//!
//! An object image is decoded from its big-endian on-disk form and handed to
//! the simulator:
//!
//! ```no_run
//! use lc3_vm::loader::Image;
//! use lc3_vm::sim::io::TerminalIO;
//! use lc3_vm::sim::Simulator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = Image::read_from("2048.obj")?;
//!
//! let mut simulator = Simulator::new();
//! simulator.load_image(&image);
//! simulator.open_io(TerminalIO::new());
//! simulator.run()?; // <-- runs until the program executes HALT
//! # Ok(())
//! # }
//! ```
//!
//! Programs that never touch the keyboard can run without a terminal; see
//! [`sim::io::BufferedIO`] for a purely in-memory IO device, and
//! [`Simulator::run_with_limit`] for bounded execution.
//!
//! [`Simulator::run_with_limit`]: sim::Simulator::run_with_limit
#![warn(missing_docs)]

pub mod isa;
pub mod loader;
pub mod sim;
