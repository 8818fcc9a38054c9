//! Reading LC-3 object images.
//!
//! An object image is a raw stream of big-endian 16-bit words: the first word
//! is the *origin* (the address the rest of the image is placed at), and the
//! remaining words are the payload, read to end-of-file. There is no header,
//! no checksum, and no relocation.
//!
//! [`Image::read_from`] decodes a file into an [`Image`], which
//! [`Simulator::load_image`] then copies into memory.
//!
//! [`Simulator::load_image`]: crate::sim::Simulator::load_image

use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::debug;

/// Errors that can occur while reading an object image.
#[derive(Debug)]
pub enum LoadErr {
    /// The file could not be opened or read.
    Io(std::io::Error),
    /// The file ended before the origin word.
    MissingOrigin,
}
impl std::fmt::Display for LoadErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadErr::Io(e) => write!(f, "cannot read image: {e}"),
            LoadErr::MissingOrigin => f.write_str("image has no origin word"),
        }
    }
}
impl std::error::Error for LoadErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadErr::Io(e) => Some(e),
            LoadErr::MissingOrigin => None,
        }
    }
}
impl From<std::io::Error> for LoadErr {
    fn from(value: std::io::Error) -> Self {
        LoadErr::Io(value)
    }
}

/// A decoded object image: an origin and the words to place there.
///
/// The payload is already in host order and already clamped so that
/// `origin + len` never wraps past the top of memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    origin: u16,
    words: Vec<u16>,
}

impl Image {
    /// Creates an image from an origin and payload, clamping the payload to
    /// the addresses remaining above the origin.
    pub fn new(origin: u16, mut words: Vec<u16>) -> Self {
        words.truncate((1usize << 16) - usize::from(origin));
        Self { origin, words }
    }

    /// Reads and decodes the object file at `path`.
    ///
    /// The whole file is read before any decoding, so a failed read leaves
    /// no state behind. A trailing odd byte is ignored, as it cannot form a
    /// word.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, LoadErr> {
        let bytes = fs::read(path.as_ref())?;
        let mut rest = bytes.as_slice();

        let origin = rest.read_u16::<BigEndian>().map_err(|_| LoadErr::MissingOrigin)?;

        let mut words = Vec::with_capacity(rest.len() / 2);
        while let Ok(word) = rest.read_u16::<BigEndian>() {
            words.push(word);
        }

        debug!(
            "read image {}: origin x{origin:04X}, {} words",
            path.as_ref().display(),
            words.len()
        );
        Ok(Self::new(origin, words))
    }

    /// The address the payload is to be placed at.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// The payload, in host order.
    pub fn words(&self) -> &[u16] {
        &self.words
    }
}
