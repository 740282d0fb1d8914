//! # EFI and Tiano compression
//!
//! This crate produces the compressed sections found in UEFI firmware volumes.
//! The algorithm is LZ77 with a Patricia tree index over an 8K window (512K for
//! the Tiano variant), followed by static Huffman coding of each block.  With `STD_OPTIONS`
//! the output is bit-for-bit the same as the EDK2 `EfiCompress` routine, so it can be
//! expanded by any conforming firmware decompressor.  `TIANO_OPTIONS` applies the
//! `TianoCompress` rules, 3 byte matches reach at most 2049 bytes back and blocks are
//! sent early enough to hold a group of 4 byte positions.
//!
//! * This transforms buffers, the stream functions simply buffer everything
//! * The 8 byte header is always little endian
//!
//! The `tiano` module has the main functions, the `tools` module has the pieces
//! (bit output, match finder, Huffman tree builder).

mod tools;
pub mod tiano;

type DYNERR = Box<dyn std::error::Error>;

/// Compression Errors
#[derive(thiserror::Error,Debug,PartialEq,Eq)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("file too large")]
    FileTooLarge,
    #[error("out of resources")]
    OutOfResources,
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },
    #[error("invalid options")]
    InvalidOptions
}

/// Options controlling compression
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Options {
    /// log2 of the sliding window size
    pub window_bits: usize,
    /// bits used to write the size of the position code length table
    pub position_bits: usize,
    /// preferred size of the block buffer in bytes, can be reduced if memory is short
    pub block_size: usize,
    /// matches of the minimum length that reach further back than this are not used
    pub short_match_reach: Option<usize>
}

/// The EFI 1.1 format, this is `STANDARD_COMPRESSION` in firmware volumes
pub const STD_OPTIONS: Options = Options {
    window_bits: 13,
    position_bits: 4,
    block_size: 1 << 14,
    short_match_reach: None
};

/// The Tiano format, found in GUIDed sections, same coding with a 512K window
pub const TIANO_OPTIONS: Options = Options {
    window_bits: 19,
    position_bits: 5,
    block_size: 1 << 14,
    short_match_reach: Some(2049)
};

/// smallest block buffer we will settle for when memory is short
pub const MIN_BLOCK_SIZE: usize = 4 * 1024;

impl Options {
    /// check that the options describe a format we can produce
    pub fn verify(&self) -> Result<(),Error> {
        if self.window_bits < 9 || self.window_bits > 19 {
            log::error!("window bits must be in 9..=19, got {}",self.window_bits);
            return Err(Error::InvalidOptions);
        }
        // position table size is written with `position_bits`, largest value is window_bits+1
        if self.position_bits > 8 || (1 << self.position_bits) <= self.window_bits + 1 {
            log::error!("{} position bits cannot hold a window of {} bits",self.position_bits,self.window_bits);
            return Err(Error::InvalidOptions);
        }
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > u16::MAX as usize {
            log::error!("block size {} out of range",self.block_size);
            return Err(Error::InvalidOptions);
        }
        Ok(())
    }
    /// number of symbols in the position set
    pub fn np(&self) -> usize {
        self.window_bits + 1
    }
}

#[test]
fn options_verify() {
    assert_eq!(STD_OPTIONS.verify(),Ok(()));
    assert_eq!(TIANO_OPTIONS.verify(),Ok(()));
    let opt = Options { position_bits: 3, ..STD_OPTIONS };
    assert_eq!(opt.verify(),Err(Error::InvalidOptions));
    let opt = Options { window_bits: 20, ..TIANO_OPTIONS };
    assert_eq!(opt.verify(),Err(Error::InvalidOptions));
    let opt = Options { block_size: 1024, ..STD_OPTIONS };
    assert_eq!(opt.verify(),Err(Error::InvalidOptions));
}
