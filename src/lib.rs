//! # LZPack Library
//!
//! Compress or expand files in the LZPack format, an LZ77 scheme with a
//! bit-packed token stream.
//! * `bitstream` carries the compressed side: bit-granular reads and writes
//!   over memory or `Read`/`Write` endpoints, plus the file header
//! * `window` carries the uncompressed side: the sliding dictionary window,
//!   the look-ahead buffer, and the tree-backed match finder
//! * `length_code` is the small static Huffman code used for match lengths
//! * `codec` ties the two sides together
//!
//! The compression/expansion functions are generics that operate on trait
//! objects with bounds `Read` or `Write`.  There are convenience functions
//! for working directly with buffers.
//!
//! ## File Example
//!
//! ```rs
//! use lzpack::*;
//! let mut in_file = std::fs::File::open("some_input_path").expect("open failed");
//! let mut out_file = std::fs::File::create("some_output_path").expect("create failed");
//! let (in_size,out_size) = compress(&mut in_file,&mut out_file,&STD_OPTIONS)
//!     .expect("compression failed");
//! eprintln!("compressed {} into {}",in_size,out_size);
//! ```
//!
//! ## Buffer Example
//!
//! ```rs
//! use lzpack::*;
//! let test_data = "This is the chaunt of the priests.  The chaunt of the priests of Mung.".as_bytes();
//! let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
//! let expanded = expand_slice(&compressed).expect("expansion failed");
//! ```

use std::io::{Read,Write};
use std::sync::RwLock;

pub mod bitstream;
pub mod length_code;
mod tree;
pub mod window;
pub mod codec;

/// Stream Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid or corrupt file format")]
    InvalidFormat,
    #[error("output buffer full and cannot grow")]
    OutOfSpace,
    #[error("out of memory")]
    OutOfMemory,
    #[error("i/o failed")]
    Io(#[from] std::io::Error)
}

/// smallest window the format accepts
pub const MIN_WINDOW_SIZE: u16 = 4;
/// smallest look-ahead buffer the format accepts
pub const MIN_LOOKAHEAD_SIZE: u16 = 2;

/// bits spent marking a token as symbol or phrase
pub(crate) const TYPE_BITS: u32 = 1;
/// bits spent on the literal byte of a symbol token
pub(crate) const NEXT_BITS: u32 = 8;
/// total bits of a symbol token
pub(crate) const SYMBOL_BITS: u32 = TYPE_BITS + NEXT_BITS;

/// Options controlling compression.
/// Both sizes are recorded in the compressed header, so expansion
/// does not need them.
#[derive(Clone,Copy)]
pub struct Options {
    /// size of the sliding window dictionary in bytes
    pub window_size: u16,
    /// size of the look-ahead buffer in bytes, at most `window_size`
    pub lookahead_size: u16
}

pub const STD_OPTIONS: Options = Options {
    window_size: 4096,
    lookahead_size: 32
};

impl Options {
    pub(crate) fn validate(&self) -> Result<(),Error> {
        if self.window_size < MIN_WINDOW_SIZE {
            log::error!("window size must be at least {}",MIN_WINDOW_SIZE);
            return Err(Error::InvalidArgument("window size too small"));
        }
        if self.lookahead_size < MIN_LOOKAHEAD_SIZE {
            log::error!("look-ahead size must be at least {}",MIN_LOOKAHEAD_SIZE);
            return Err(Error::InvalidArgument("look-ahead size too small"));
        }
        if self.lookahead_size > self.window_size {
            log::error!("look-ahead cannot be bigger than the window");
            return Err(Error::InvalidArgument("look-ahead bigger than window"));
        }
        // the length code's overflow tail is decoded from a 16-bit peek,
        // which bounds the longest expressible match
        let longest = length_code::max_representable(self.min_match_length());
        if self.lookahead_size > longest {
            log::error!("a look-ahead over {} cannot be expressed by the length code",longest);
            return Err(Error::InvalidArgument("look-ahead too big for the length code"));
        }
        Ok(())
    }
    /// bits needed to express any offset into the window
    pub(crate) fn offset_bits(&self) -> u32 {
        number_of_bits(self.window_size - 1)
    }
    /// Smallest match length worth a phrase token, i.e., the smallest `m`
    /// such that a phrase token is strictly shorter than `m` literals.
    pub(crate) fn min_match_length(&self) -> u16 {
        ((TYPE_BITS + self.offset_bits() + length_code::MIN_CODE_BITS) / SYMBOL_BITS) as u16 + 1
    }
}

/// bits needed to represent `value`, with 0 taking one bit
pub(crate) fn number_of_bits(value: u16) -> u32 {
    match value {
        0 => 1,
        v => 16 - v.leading_zeros()
    }
}

/// Signature of the progress callback: uncompressed bytes processed,
/// compressed bytes processed, percent complete (0.0 when the input
/// size is unknown, e.g. a pipe).
pub type ProgressFn = fn(u64,u64,f32);

static PROGRESS: RwLock<Option<ProgressFn>> = RwLock::new(None);

/// Install or remove the process-wide progress callback.
/// The callback is invoked once per token on both compression and
/// expansion, possibly from several threads at once if independent
/// streams are being driven in parallel.
pub fn set_progress_handler(handler: Option<ProgressFn>) {
    if let Ok(mut slot) = PROGRESS.write() {
        *slot = handler;
    }
}

pub(crate) fn progress_handler() -> Option<ProgressFn> {
    match PROGRESS.read() {
        Ok(slot) => *slot,
        Err(_) => None
    }
}

/// Compress from any reader to any writer.
/// Returns (bytes read, bytes written), the latter including the header.
pub fn compress<R,W>(input: &mut R, output: &mut W, opts: &Options) -> Result<(u64,u64),Error>
where R: Read, W: Write {
    let mut src = window::InputWindow::from_reader(input,opts)?;
    let mut dst = bitstream::BitWriter::to_writer(output);
    let out_size = codec::compress(&mut src,&mut dst)?;
    Ok((src.processed_bytes(),out_size))
}

/// Expand from any reader to any writer.
/// Returns (bytes read, bytes written); window and look-ahead sizes are
/// recovered from the header.
pub fn expand<R,W>(input: &mut R, output: &mut W) -> Result<(u64,u64),Error>
where R: Read, W: Write {
    let mut src = bitstream::BitReader::from_reader(input);
    let mut dst = window::OutputWindow::to_writer(output);
    let out_size = codec::decompress(&mut src,&mut dst)?;
    Ok(((src.processed_bits() + 7) / 8,out_size))
}

/// Convenience function, compresses a slice returning a Vec
pub fn compress_slice(data: &[u8], opts: &Options) -> Result<Vec<u8>,Error> {
    let mut src = window::InputWindow::from_slice(data,opts)?;
    let mut dst = bitstream::BitWriter::to_memory(0,true)?;
    codec::compress(&mut src,&mut dst)?;
    Ok(dst.into_buffer().expect("memory sink always yields its buffer"))
}

/// Convenience function, expands a slice returning a Vec
pub fn expand_slice(data: &[u8]) -> Result<Vec<u8>,Error> {
    let mut src = bitstream::BitReader::from_slice(data);
    let mut dst = window::OutputWindow::to_memory(0,true)?;
    codec::decompress(&mut src,&mut dst)?;
    Ok(dst.into_buffer().expect("memory sink always yields its buffer"))
}

#[test]
fn bit_widths() {
    assert_eq!(number_of_bits(0),1);
    assert_eq!(number_of_bits(1),1);
    assert_eq!(number_of_bits(3),2);
    assert_eq!(number_of_bits(4),3);
    assert_eq!(number_of_bits(511),9);
    assert_eq!(number_of_bits(512),10);
    assert_eq!(number_of_bits(u16::MAX),16);
}

#[test]
fn minimum_match_pays_off() {
    // a phrase of the minimum length must always be strictly cheaper
    // than the same bytes as literals, and the next shorter length
    // must not be
    for w in [4u16,5,8,9,16,255,256,4096,65535] {
        let opts = Options { window_size: w, lookahead_size: 2 };
        let m = opts.min_match_length() as u32;
        let phrase_bits = TYPE_BITS + opts.offset_bits() + length_code::MIN_CODE_BITS;
        assert!(phrase_bits < SYMBOL_BITS * m);
        assert!(phrase_bits >= SYMBOL_BITS * (m - 1));
    }
}

#[test]
fn options_are_checked() {
    assert!(Options { window_size: 3, lookahead_size: 2 }.validate().is_err());
    assert!(Options { window_size: 4, lookahead_size: 1 }.validate().is_err());
    assert!(Options { window_size: 4, lookahead_size: 5 }.validate().is_err());
    assert!(Options { window_size: 4, lookahead_size: 4 }.validate().is_ok());
    assert!(STD_OPTIONS.validate().is_ok());
    // the length-code tail caps the look-ahead; minimum match is 2 at
    // this window size, so 2 + 6 + 1023 is the last legal value
    assert!(Options { window_size: 4096, lookahead_size: 1031 }.validate().is_ok());
    assert!(Options { window_size: 4096, lookahead_size: 1032 }.validate().is_err());
}
