//! LZ77 with static Huffman blocks, as used in UEFI firmware
//!
//! This produces the same bit-for-bit output as the EDK2 `EfiCompress` routine when
//! used with `STD_OPTIONS`.  With `TIANO_OPTIONS` the window and position code grow, and
//! the match and block rules of `TianoCompress` are applied.
//!
//! * The whole input is buffered, the format needs the size up front anyway
//! * The 8 byte header is always little endian
//!
//! Compressed format:
//! * dword: compressed size + 1 (bytes of bit stream plus the terminator)
//! * dword: original size
//! * blocks, each with a 16 bit token count, code tables, then the tokens
//! * a single 0 byte
//!
//! The destination is given as a capacity.  Compression always runs to completion,
//! bytes that do not fit are dropped, and if anything was dropped the caller is told
//! how much room is needed.

use std::io::{Read,Write};
use crate::{Error,Options,DYNERR,MIN_BLOCK_SIZE};
use crate::tools::bit_writer::BitWriter;
use crate::tools::bit_reader::BitReader;
use crate::tools::huffman::{TreeBuilder,CodeTable,MAX_CODE_LEN};
use crate::tools::try_alloc;
use crate::tools::match_finder::{MatchFinder,THRESHOLD,MAX_MATCH};

/// size of the char and length set, bytes then match lengths
const NC: usize = 255 + MAX_MATCH + 2 - THRESHOLD;
/// bits to write the char and length table size
const CBIT: usize = 9;
/// size of the set used to code the char and length table
const NT: usize = MAX_CODE_LEN + 3;
/// bits to write the NT table size
const TBIT: usize = 5;

/// Summary of a compression run
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Stats {
    /// bytes of input
    pub orig_size: usize,
    /// bytes of bit stream, not counting header or terminator
    pub comp_size: usize,
    /// bytes the destination needs to hold the whole output
    pub required: usize,
    /// CRC-16/ARC of the input, informational, it is not written
    pub crc: u16
}

/// Decoded unit of the token stream
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Token {
    Literal(u8),
    /// copy `length` bytes starting `distance` bytes back
    Match { length: usize, distance: usize }
}

fn bit_len(x: usize) -> usize {
    (usize::BITS - x.leading_zeros()) as usize
}

/// Allocate the block buffer, shrinking the request by 10% at a time if memory is short.
/// Returns the buffer and the block size that was settled on.
fn alloc_block_buf(mut size: usize) -> Result<(Vec<u8>,usize),Error> {
    loop {
        match try_alloc(size,0u8) {
            Ok(buf) => return Ok((buf,size)),
            Err(_) => {
                size = size / 10 * 9;
                if size < MIN_BLOCK_SIZE {
                    log::error!("could not allocate block buffer");
                    return Err(Error::OutOfResources);
                }
                log::warn!("block buffer reduced to {}",size);
            }
        }
    }
}

/// All state for one compression run.  Nothing is shared between runs.
struct Encoder<'a> {
    np: usize,
    pbit: usize,
    finder: MatchFinder<'a>,
    out: BitWriter,
    trees: TreeBuilder,
    /// tokens waiting to be sent, a flag byte precedes each group of 8
    buf: Vec<u8>,
    block_size: usize,
    /// bytes used to buffer a position, windows over 64K need 4
    pos_bytes: usize,
    /// a group of 8 tokens is only started with more than this much room left
    group_room: usize,
    output_pos: usize,
    output_mask: u8,
    flag_pos: usize,
    c_freq: Vec<u16>,
    c_len: Vec<u8>,
    c_code: Vec<u16>,
    p_freq: Vec<u16>,
    t_freq: Vec<u16>,
    /// shared by the NT and NP sets, the NT codes are done before the NP tree is built
    pt_len: Vec<u8>,
    pt_code: Vec<u16>
}

impl <'a> Encoder<'a> {
    fn create(src: &'a [u8],capacity: usize,opt: &Options) -> Result<Self,Error> {
        opt.verify()?;
        let np = opt.np();
        let npt = usize::max(NT,np);
        let (buf,block_size) = alloc_block_buf(opt.block_size)?;
        let pos_bytes = match opt.window_bits > 16 {
            true => 4,
            false => 2
        };
        Ok(Self {
            np,
            pbit: opt.position_bits,
            finder: MatchFinder::create(src,opt)?,
            out: BitWriter::create(capacity),
            trees: TreeBuilder::create(NC)?,
            buf,
            block_size,
            pos_bytes,
            group_room: 8 * (1 + pos_bytes),
            output_pos: 0,
            output_mask: 0,
            flag_pos: 0,
            c_freq: try_alloc(2*NC-1,0)?,
            c_len: try_alloc(NC,0)?,
            c_code: try_alloc(NC,0)?,
            p_freq: try_alloc(2*np-1,0)?,
            t_freq: try_alloc(2*NT-1,0)?,
            pt_len: try_alloc(npt,0)?,
            pt_code: try_alloc(npt,0)?
        })
    }
    /// Main loop, matches are taken lazily: a match is only used if the match
    /// starting one byte later is not longer.
    fn encode(&mut self) {
        self.finder.prime();
        while self.finder.remainder > 0 {
            let last_len = self.finder.match_len;
            let last_pos = self.finder.match_pos;
            self.finder.get_next_match();
            self.finder.clamp_match();
            if self.finder.match_len > last_len || last_len < THRESHOLD {
                let c = self.finder.text[self.finder.pos - 1];
                log::trace!("literal {}",c);
                self.compress_output(c as usize,0);
            } else {
                let p = self.finder.distance(last_pos);
                log::trace!("match {} at {}",last_len,p);
                self.compress_output(last_len + 256 - THRESHOLD,p);
                for _i in 1..last_len {
                    self.finder.get_next_match();
                }
                self.finder.clamp_match();
            }
        }
        self.send_block();
        self.out.flush();
    }
    /// Buffer a token, `c` is a byte or a length code, `p` is the position code if any.
    fn compress_output(&mut self,c: usize,p: usize) {
        self.output_mask >>= 1;
        if self.output_mask == 0 {
            self.output_mask = 0x80;
            if self.output_pos >= self.block_size - self.group_room {
                self.send_block();
                self.output_pos = 0;
            }
            self.flag_pos = self.output_pos;
            self.output_pos += 1;
            self.buf[self.flag_pos] = 0;
        }
        self.buf[self.output_pos] = c as u8;
        self.output_pos += 1;
        self.c_freq[c] += 1;
        if c >= 256 {
            self.buf[self.flag_pos] |= self.output_mask;
            for i in (0..self.pos_bytes).rev() {
                self.buf[self.output_pos] = (p >> (8*i)) as u8;
                self.output_pos += 1;
            }
            self.p_freq[bit_len(p)] += 1;
        }
    }
    /// Write out the buffered tokens with their code tables.
    fn send_block(&mut self) {
        let root = self.trees.make_tree(NC,&mut self.c_freq,&mut self.c_len,&mut self.c_code);
        let size = self.c_freq[root];
        log::debug!("send block with {} tokens",size);
        self.out.put_bits(16,size);
        if root >= NC {
            self.count_t_freq();
            let root = self.trees.make_tree(NT,&mut self.t_freq,&mut self.pt_len,&mut self.pt_code);
            if root >= NT {
                self.write_pt_len(NT,TBIT,Some(3));
            } else {
                self.out.put_bits(TBIT,0);
                self.out.put_bits(TBIT,root);
            }
            self.write_c_len();
        } else {
            self.out.put_bits(TBIT,0);
            self.out.put_bits(TBIT,0);
            self.out.put_bits(CBIT,0);
            self.out.put_bits(CBIT,root);
        }
        let root = self.trees.make_tree(self.np,&mut self.p_freq,&mut self.pt_len,&mut self.pt_code);
        if root >= self.np {
            self.write_pt_len(self.np,self.pbit,None);
        } else {
            self.out.put_bits(self.pbit,0);
            self.out.put_bits(self.pbit,root);
        }
        let mut pos = 0;
        let mut flags: u8 = 0;
        for i in 0..size as usize {
            if i % 8 == 0 {
                flags = self.buf[pos];
                pos += 1;
            } else {
                flags <<= 1;
            }
            if flags & 0x80 != 0 {
                self.encode_c(self.buf[pos] as usize + 256);
                pos += 1;
                let mut k = 0;
                for _i in 0..self.pos_bytes {
                    k = (k << 8) + self.buf[pos] as usize;
                    pos += 1;
                }
                self.encode_p(k);
            } else {
                self.encode_c(self.buf[pos] as usize);
                pos += 1;
            }
        }
        self.c_freq[..NC].fill(0);
        self.p_freq[..self.np].fill(0);
    }
    /// length of the char and length table once trailing zeros are dropped
    fn c_len_count(&self) -> usize {
        let mut n = NC;
        while n > 0 && self.c_len[n-1] == 0 {
            n -= 1;
        }
        n
    }
    /// Count the symbols that will be used to write the char and length table.
    /// 0, 1, 2 code runs of zeros, k+2 codes length k.
    fn count_t_freq(&mut self) {
        self.t_freq[..NT].fill(0);
        let n = self.c_len_count();
        let mut i = 0;
        while i < n {
            let k = self.c_len[i] as usize;
            i += 1;
            if k == 0 {
                let mut count = 1;
                while i < n && self.c_len[i] == 0 {
                    i += 1;
                    count += 1;
                }
                if count <= 2 {
                    self.t_freq[0] += count;
                } else if count <= 18 {
                    self.t_freq[1] += 1;
                } else if count == 19 {
                    self.t_freq[0] += 1;
                    self.t_freq[1] += 1;
                } else {
                    self.t_freq[2] += 1;
                }
            } else {
                self.t_freq[k+2] += 1;
            }
        }
    }
    /// Write the code lengths in `pt_len`.  If `special` is given, a 2 bit count of
    /// zeros is written after that many lengths.
    fn write_pt_len(&mut self,n: usize,nbit: usize,special: Option<usize>) {
        let mut n = n;
        while n > 0 && self.pt_len[n-1] == 0 {
            n -= 1;
        }
        self.out.put_bits(nbit,n);
        let mut i = 0;
        while i < n {
            let k = self.pt_len[i] as usize;
            i += 1;
            if k <= 6 {
                self.out.put_bits(3,k);
            } else {
                // 7 and up is written as k-4 ones and a zero
                self.out.put_bits(k-3,(1usize << (k-3)) - 2);
            }
            if Some(i) == special {
                while i < 6 && self.pt_len[i] == 0 {
                    i += 1;
                }
                self.out.put_bits(2,(i-3) & 3);
            }
        }
    }
    /// Write the char and length code lengths using the NT code.
    fn write_c_len(&mut self) {
        let n = self.c_len_count();
        self.out.put_bits(CBIT,n);
        let mut i = 0;
        while i < n {
            let k = self.c_len[i] as usize;
            i += 1;
            if k == 0 {
                let mut count = 1;
                while i < n && self.c_len[i] == 0 {
                    i += 1;
                    count += 1;
                }
                if count <= 2 {
                    for _k in 0..count {
                        self.put_t(0);
                    }
                } else if count <= 18 {
                    self.put_t(1);
                    self.out.put_bits(4,count-3);
                } else if count == 19 {
                    self.put_t(0);
                    self.put_t(1);
                    self.out.put_bits(4,15);
                } else {
                    self.put_t(2);
                    self.out.put_bits(CBIT,count-20);
                }
            } else {
                self.put_t(k+2);
            }
        }
    }
    fn put_t(&mut self,t: usize) {
        self.out.put_bits(self.pt_len[t] as usize,self.pt_code[t]);
    }
    fn encode_c(&mut self,c: usize) {
        self.out.put_bits(self.c_len[c] as usize,self.c_code[c]);
    }
    /// The position code is the bit length of `p`, the bits below the leading 1 follow.
    fn encode_p(&mut self,p: usize) {
        let c = bit_len(p);
        self.out.put_bits(self.pt_len[c] as usize,self.pt_code[c]);
        if c > 1 {
            self.out.put_bits(c-1,p & ((1 << (c-1)) - 1));
        }
    }
}

/// Run the compressor against a destination of size `capacity`.  The returned buffer
/// holds whatever fit, the stats tell how much was needed.
fn compress_bounded(src: &[u8],capacity: usize,opt: &Options) -> Result<(Vec<u8>,Stats),Error> {
    if src.len() > u32::MAX as usize {
        log::error!("input of {} bytes cannot be described by the header",src.len());
        return Err(Error::FileTooLarge);
    }
    let mut encoder = Encoder::create(src,capacity,opt)?;
    encoder.out.put_dword(0);
    encoder.out.put_dword(0);
    encoder.encode();
    encoder.out.put_raw(0);
    let comp_size = encoder.out.comp_size();
    let orig_size = encoder.finder.orig_size();
    encoder.out.patch_dword(0,(comp_size + 1) as u32);
    encoder.out.patch_dword(4,orig_size as u32);
    let stats = Stats {
        orig_size,
        comp_size,
        required: comp_size + 1 + 8,
        crc: encoder.finder.crc()
    };
    log::debug!("compressed {} bytes into {}, CRC {:04X}",stats.orig_size,stats.required,stats.crc);
    Ok((encoder.out.into_inner(),stats))
}

/// Compress `src`, the output can be at most `dst_capacity` bytes.
/// If it would be larger the error gives the size needed.
pub fn compress(src: &[u8],dst_capacity: usize,opt: &Options) -> Result<Vec<u8>,Error> {
    compress_with_stats(src,dst_capacity,opt).map(|(ans,_stats)| ans)
}

/// Same as `compress`, also returning statistics about the run
pub fn compress_with_stats(src: &[u8],dst_capacity: usize,opt: &Options) -> Result<(Vec<u8>,Stats),Error> {
    let (ans,stats) = compress_bounded(src,dst_capacity,opt)?;
    if stats.required > dst_capacity {
        return Err(Error::BufferTooSmall { required: stats.required });
    }
    Ok((ans,stats))
}

/// Compress into a caller supplied buffer, returning the number of bytes written.
/// When the buffer is too small it will still have been partly written, its contents
/// should be discarded.
pub fn compress_into(src: &[u8],dst: &mut [u8],opt: &Options) -> Result<usize,Error> {
    let (ans,stats) = compress_bounded(src,dst.len(),opt)?;
    dst[..ans.len()].copy_from_slice(&ans);
    if stats.required > dst.len() {
        return Err(Error::BufferTooSmall { required: stats.required });
    }
    Ok(stats.required)
}

/// State for reading the compressed stream
struct Decoder {
    np: usize,
    pbit: usize,
    bits: BitReader,
    /// tokens left in the current block
    block_remaining: usize,
    c_table: CodeTable,
    t_table: CodeTable,
    p_table: CodeTable
}

impl Decoder {
    fn create(dat: &[u8],opt: &Options) -> Self {
        Self {
            np: opt.np(),
            pbit: opt.position_bits,
            bits: BitReader::create(dat),
            block_remaining: 0,
            c_table: CodeTable::single(0),
            t_table: CodeTable::single(0),
            p_table: CodeTable::single(0)
        }
    }
    /// Read lengths for the NT or NP set, see `Encoder::write_pt_len`.
    fn read_pt_len(&mut self,nn: usize,nbit: usize,special: Option<usize>) -> Result<CodeTable,Error> {
        let n = self.bits.get_bits(nbit)? as usize;
        if n == 0 {
            let sym = self.bits.get_bits(nbit)? as usize;
            if sym >= nn {
                log::error!("single code {} out of range",sym);
                return Err(Error::FileFormatMismatch);
            }
            return Ok(CodeTable::single(sym));
        }
        if n > nn {
            log::error!("table size {} out of range",n);
            return Err(Error::FileFormatMismatch);
        }
        let mut len = vec![0u8;nn];
        let mut i = 0;
        while i < n {
            let mut k = self.bits.get_bits(3)? as usize;
            if k == 7 {
                while self.bits.get_bit()? == 1 {
                    k += 1;
                    if k > MAX_CODE_LEN {
                        log::error!("code length exceeds {}",MAX_CODE_LEN);
                        return Err(Error::FileFormatMismatch);
                    }
                }
            }
            len[i] = k as u8;
            i += 1;
            if Some(i) == special {
                i += self.bits.get_bits(2)? as usize;
            }
        }
        CodeTable::from_lengths(&len)
    }
    /// Read lengths for the char and length set, see `Encoder::write_c_len`.
    fn read_c_len(&mut self) -> Result<CodeTable,Error> {
        let n = self.bits.get_bits(CBIT)? as usize;
        if n == 0 {
            let sym = self.bits.get_bits(CBIT)? as usize;
            if sym >= NC {
                log::error!("single code {} out of range",sym);
                return Err(Error::FileFormatMismatch);
            }
            return Ok(CodeTable::single(sym));
        }
        if n > NC {
            log::error!("table size {} out of range",n);
            return Err(Error::FileFormatMismatch);
        }
        let mut len = vec![0u8;NC];
        let mut i = 0;
        while i < n {
            let t = self.t_table.decode(&mut self.bits)?;
            match t {
                0 => i += 1,
                1 => i += self.bits.get_bits(4)? as usize + 3,
                2 => i += self.bits.get_bits(CBIT)? as usize + 20,
                k => {
                    len[i] = (k - 2) as u8;
                    i += 1;
                }
            }
        }
        if i > n {
            log::error!("run of zeros overflows table");
            return Err(Error::FileFormatMismatch);
        }
        CodeTable::from_lengths(&len)
    }
    fn next_token(&mut self) -> Result<Token,Error> {
        if self.block_remaining == 0 {
            self.block_remaining = self.bits.get_bits(16)? as usize;
            log::debug!("block with {} tokens",self.block_remaining);
            if self.block_remaining == 0 {
                log::error!("empty block where data was expected");
                return Err(Error::FileFormatMismatch);
            }
            self.t_table = self.read_pt_len(NT,TBIT,Some(3))?;
            self.c_table = self.read_c_len()?;
            self.p_table = self.read_pt_len(self.np,self.pbit,None)?;
        }
        self.block_remaining -= 1;
        let c = self.c_table.decode(&mut self.bits)?;
        if c < 256 {
            return Ok(Token::Literal(c as u8));
        }
        let sym = self.p_table.decode(&mut self.bits)?;
        let p = match sym {
            0 | 1 => sym,
            _ => (1 << (sym-1)) + self.bits.get_bits(sym-1)? as usize
        };
        Ok(Token::Match { length: c + THRESHOLD - 256, distance: p + 1 })
    }
}

/// Check the header and return (original size, bit stream)
fn parse_header(src: &[u8]) -> Result<(usize,&[u8]),Error> {
    if src.len() < 8 {
        log::error!("too short for header");
        return Err(Error::FileFormatMismatch);
    }
    let comp_size = u32::from_le_bytes([src[0],src[1],src[2],src[3]]) as usize;
    let orig_size = u32::from_le_bytes([src[4],src[5],src[6],src[7]]) as usize;
    if comp_size > src.len() - 8 {
        log::error!("header claims {} bytes, only {} available",comp_size,src.len() - 8);
        return Err(Error::FileFormatMismatch);
    }
    Ok((orig_size,&src[8..8+comp_size]))
}

/// Decode the token stream, stopping when the tokens cover the original size.
pub fn tokens(src: &[u8],opt: &Options) -> Result<Vec<Token>,Error> {
    opt.verify()?;
    let (orig_size,dat) = parse_header(src)?;
    let mut decoder = Decoder::create(dat,opt);
    let mut ans = Vec::new();
    let mut count = 0;
    while count < orig_size {
        let tok = decoder.next_token()?;
        count += match tok {
            Token::Literal(_) => 1,
            Token::Match { length, .. } => length
        };
        ans.push(tok);
    }
    Ok(ans)
}

/// Expand compressed data, the result has exactly the size given in the header.
pub fn expand(src: &[u8],opt: &Options) -> Result<Vec<u8>,Error> {
    opt.verify()?;
    let (orig_size,dat) = parse_header(src)?;
    let mut decoder = Decoder::create(dat,opt);
    let mut ans: Vec<u8> = Vec::new();
    while ans.len() < orig_size {
        match decoder.next_token()? {
            Token::Literal(c) => ans.push(c),
            Token::Match { length, distance } => {
                if distance > ans.len() {
                    log::error!("match reaches {} bytes back with {} bytes of output",distance,ans.len());
                    return Err(Error::FileFormatMismatch);
                }
                // source and destination can overlap, copy one byte at a time
                let start = ans.len() - distance;
                for i in 0..length {
                    ans.push(ans[start+i]);
                }
            }
        }
    }
    if ans.len() > orig_size {
        log::error!("tokens overrun the original size");
        return Err(Error::FileFormatMismatch);
    }
    log::debug!("expanded using {} of {} bits",decoder.bits.consumed(),dat.len()*8);
    Ok(ans)
}

/// Main compression function.
/// `expanded_in` is an object with the `Read` trait, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with the `Write` trait.
/// Returns (in_size,out_size) or error.
pub fn compress_stream<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    let mut src = Vec::new();
    expanded_in.read_to_end(&mut src)?;
    log::debug!("read {} bytes",src.len());
    let (ans,stats) = compress_with_stats(&src,usize::MAX,opt)?;
    log::info!("CRC-16 of input is {:04X}",stats.crc);
    compressed_out.write_all(&ans)?;
    compressed_out.flush()?;
    Ok((src.len() as u64,ans.len() as u64))
}

/// Main decompression function.
/// `compressed_in` is an object with the `Read` trait, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with the `Write` trait.
/// Returns (in_size,out_size) or error.
pub fn expand_stream<R,W>(compressed_in: &mut R,expanded_out: &mut W,opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    let mut src = Vec::new();
    compressed_in.read_to_end(&mut src)?;
    log::debug!("read {} bytes",src.len());
    let ans = expand(&src,opt)?;
    expanded_out.write_all(&ans)?;
    expanded_out.flush()?;
    Ok((src.len() as u64,ans.len() as u64))
}

/// Convenience function, compresses a slice with whatever capacity it takes
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut ans: Vec<u8> = Vec::new();
    compress_stream(&mut std::io::Cursor::new(slice),&mut ans,opt)?;
    Ok(ans)
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    Ok(expand(slice,opt)?)
}

// *************** TESTS *****************

#[cfg(test)]
use crate::{STD_OPTIONS,TIANO_OPTIONS};

#[cfg(test)]
fn lcg_bytes(n: usize,modulus: u32) -> Vec<u8> {
    let mut ans = Vec::new();
    let mut x: u32 = 2463534242;
    for _i in 0..n {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        ans.push(((x >> 16) % modulus) as u8);
    }
    ans
}

#[test]
fn compression_works() {
    let expected = [
        ("","08000000 00000000 00000000000000 00"),
        ("A","08000000 01000000 00010000041000 00"),
        ("AB","0A000000 02000000 0002200424 30B70040 00")
    ];
    for (test_data,hex_str) in expected {
        let compressed = compress(test_data.as_bytes(),1024,&STD_OPTIONS).expect("compression failed");
        assert_eq!(compressed,hex::decode(hex_str.replace(" ","")).unwrap());
    }
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility_across_window() {
    // enough to slide the window a few times and send several blocks
    let test_data = lcg_bytes(50000,6);
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < test_data.len());
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn incompressible_data() {
    let test_data = lcg_bytes(20000,256);
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn long_runs() {
    let test_data = vec![b'A';100000];
    let compressed = compress(&test_data,4096,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < 1000);
    let expanded = expand(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
    // every match after the first literal has the longest length
    let toks = tokens(&compressed,&STD_OPTIONS).expect("tokens failed");
    assert_eq!(toks[0],Token::Literal(b'A'));
    assert_eq!(toks[1],Token::Match { length: MAX_MATCH, distance: 1 });
}

#[test]
fn header_consistency() {
    for n in [0,1,2,100,9000] {
        let test_data = lcg_bytes(n,16);
        let compressed = compress(&test_data,1 << 16,&STD_OPTIONS).expect("compression failed");
        let comp_size = u32::from_le_bytes([compressed[0],compressed[1],compressed[2],compressed[3]]);
        let orig_size = u32::from_le_bytes([compressed[4],compressed[5],compressed[6],compressed[7]]);
        assert_eq!(orig_size as usize,n);
        assert_eq!(comp_size as usize,compressed.len() - 8);
        assert_eq!(compressed[compressed.len()-1],0);
    }
}

#[test]
fn required_size_reported() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let required = match compress(test_data,0,&STD_OPTIONS) {
        Err(Error::BufferTooSmall { required }) => required,
        _ => panic!("expected buffer too small")
    };
    let exact = compress(test_data,required,&STD_OPTIONS).expect("compression failed");
    let roomy = compress(test_data,1 << 16,&STD_OPTIONS).expect("compression failed");
    assert_eq!(exact.len(),required);
    assert_eq!(exact,roomy);
    assert_eq!(compress(test_data,required-1,&STD_OPTIONS),Err(Error::BufferTooSmall { required }));
}

#[test]
fn partial_fill() {
    let test_data = "abcabcabc".as_bytes();
    let full = compress(test_data,1024,&STD_OPTIONS).expect("compression failed");
    let mut dst = [0xffu8;8];
    match compress_into(test_data,&mut dst,&STD_OPTIONS) {
        Err(Error::BufferTooSmall { required }) => assert_eq!(required,full.len()),
        _ => panic!("expected buffer too small")
    }
    assert!(full.len() > 8);
    // header is patched as far as it fits
    assert_eq!(dst[..],full[..8]);
    let mut dst = vec![0u8;full.len()+10];
    assert_eq!(compress_into(test_data,&mut dst,&STD_OPTIONS),Ok(full.len()));
    assert_eq!(dst[..full.len()],full[..]);
}

#[test]
fn determinism() {
    let test_data = lcg_bytes(30000,10);
    let c1 = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let c2 = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert_eq!(c1,c2);
}

#[test]
fn matches_are_valid() {
    let test_data = "the rain in spain falls mainly on the plain, the rain in spain".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let toks = tokens(&compressed,&STD_OPTIONS).expect("tokens failed");
    let mut pos = 0;
    let mut saw_match = false;
    for tok in toks {
        match tok {
            Token::Literal(c) => {
                assert_eq!(c,test_data[pos]);
                pos += 1;
            },
            Token::Match { length, distance } => {
                assert!(length >= THRESHOLD && length <= MAX_MATCH);
                assert!(distance >= 1 && distance <= pos);
                for i in 0..length {
                    assert_eq!(test_data[pos+i],test_data[pos+i-distance]);
                }
                pos += length;
                saw_match = true;
            }
        }
    }
    assert!(saw_match);
    assert_eq!(pos,test_data.len());
}

#[test]
fn stats_are_reported() {
    let test_data = "123456789".as_bytes();
    let (ans,stats) = compress_with_stats(test_data,1024,&STD_OPTIONS).expect("compression failed");
    assert_eq!(stats.orig_size,9);
    assert_eq!(stats.required,ans.len());
    assert_eq!(stats.comp_size + 9,ans.len());
    // check value of CRC-16/ARC
    assert_eq!(stats.crc,0xBB3D);
}

#[test]
fn tiano_invertibility() {
    let mut test_data = lcg_bytes(12000,8);
    // repeat from far back, outside the reach of the 8K window
    let far = test_data[..3000].to_vec();
    test_data.extend_from_slice(&far);
    let compressed = compress_slice(&test_data,&TIANO_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&TIANO_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
    let toks = tokens(&compressed,&TIANO_OPTIONS).expect("tokens failed");
    assert!(toks.iter().any(|t| match t {
        Token::Match { length: _, distance } => *distance == 12000,
        _ => false
    }));
    // the EFI format cannot reach that far
    let efi = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert!(efi.len() > compressed.len());
}

#[test]
fn bad_input_rejected() {
    assert_eq!(expand(&[1,2,3],&STD_OPTIONS),Err(Error::FileFormatMismatch));
    // header claims more data than is present
    assert_eq!(expand(&[0x20,0,0,0,1,0,0,0,0],&STD_OPTIONS),Err(Error::FileFormatMismatch));
    // stream ends before the promised output
    let mut compressed = compress_slice("hello hello hello".as_bytes(),&STD_OPTIONS).expect("compression failed");
    compressed[4] = 200;
    assert_eq!(expand(&compressed,&STD_OPTIONS),Err(Error::FileFormatMismatch));
}

#[test]
fn bad_options_rejected() {
    let opt = Options { window_bits: 8, ..STD_OPTIONS };
    assert_eq!(compress("abc".as_bytes(),1024,&opt),Err(Error::InvalidOptions));
}

#[test]
fn block_boundaries() {
    // the first block count leads the bit stream, it depends on how early a block is sent
    let compressed = compress_slice(&lcg_bytes(50000,6),&STD_OPTIONS).expect("compression failed");
    assert_eq!(u16::from_be_bytes([compressed[8],compressed[9]]),6192);
    let compressed = compress_slice(&lcg_bytes(30000,16),&TIANO_OPTIONS).expect("compression failed");
    assert_eq!(u16::from_be_bytes([compressed[8],compressed[9]]),6464);
}

#[test]
fn short_matches_stay_close() {
    let test_data = lcg_bytes(30000,16);
    let far_short = |toks: &Vec<Token>| toks.iter().filter(|t| match t {
        Token::Match { length, distance } => *length == THRESHOLD && *distance > 2049,
        _ => false
    }).count();
    let compressed = compress_slice(&test_data,&TIANO_OPTIONS).expect("compression failed");
    let toks = tokens(&compressed,&TIANO_OPTIONS).expect("tokens failed");
    assert_eq!(far_short(&toks),0);
    assert_eq!(expand(&compressed,&TIANO_OPTIONS),Ok(test_data.clone()));
    // EFI has no such limit
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let toks = tokens(&compressed,&STD_OPTIONS).expect("tokens failed");
    assert!(far_short(&toks) > 0);
}

#[cfg(test)]
fn single_code_stream(c: usize,orig_size: u32) -> Vec<u8> {
    // one block whose char and position tables each hold a single symbol
    let mut w = BitWriter::create(64);
    w.put_dword(0);
    w.put_dword(orig_size);
    w.put_bits(16,1u16);
    w.put_bits(TBIT,0);
    w.put_bits(TBIT,0);
    w.put_bits(CBIT,0);
    w.put_bits(CBIT,c);
    w.put_bits(STD_OPTIONS.position_bits,0);
    w.put_bits(STD_OPTIONS.position_bits,0);
    w.flush();
    w.put_raw(0);
    let comp_size = w.comp_size();
    w.patch_dword(0,comp_size as u32 + 1);
    w.into_inner()
}

#[test]
fn length_codes_end_at_max_match() {
    assert_eq!(NC,510);
    let toks = tokens(&single_code_stream(NC-1,MAX_MATCH as u32),&STD_OPTIONS).expect("tokens failed");
    assert_eq!(toks,vec![Token::Match { length: MAX_MATCH, distance: 1 }]);
    // one past the last length code would be a match of 257
    assert_eq!(tokens(&single_code_stream(NC,MAX_MATCH as u32 + 1),&STD_OPTIONS),Err(Error::FileFormatMismatch));
}
