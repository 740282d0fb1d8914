//! Bounded bit output
//!
//! Bits are packed MSB first.  The destination has a fixed capacity, bytes that would
//! land past it are dropped, but the size counter keeps going.  This way a single pass
//! tells the caller how big the buffer needed to be.

use num_traits::PrimInt;

pub struct BitWriter {
    buf: Vec<u8>,
    capacity: usize,
    /// number of free bits remaining in `sub_bit_buf`, counting down from 8
    bit_count: u32,
    sub_bit_buf: u32,
    /// bytes produced by `put_bits`, whether or not they were stored
    comp_size: usize
}

impl BitWriter {
    pub fn create(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
            bit_count: 8,
            sub_bit_buf: 0,
            comp_size: 0
        }
    }
    fn put_byte(&mut self,by: u8) {
        if self.buf.len() < self.capacity {
            self.buf.push(by);
        }
    }
    /// output `x` using `n` bits, `n` can be up to 24 and `x` must fit
    pub fn put_bits<T: PrimInt>(&mut self,n: usize,x: T) {
        debug_assert!(n <= 24,"bit field of {} bits is too wide",n);
        let x = match x.to_u32() {
            Some(v) if (v as u64) < 1u64 << n => v,
            _ => {
                debug_assert!(false,"value does not fit in {} bits",n);
                0
            }
        };
        let mut n = n as u32;
        while n >= self.bit_count {
            n -= self.bit_count;
            self.put_byte((self.sub_bit_buf | (x >> n)) as u8);
            self.comp_size += 1;
            self.sub_bit_buf = 0;
            self.bit_count = 8;
        }
        self.bit_count -= n;
        self.sub_bit_buf |= x << self.bit_count;
    }
    /// push out any partial byte
    pub fn flush(&mut self) {
        self.put_bits(7,0);
    }
    /// output 4 bytes little endian, not counted as compressed data
    pub fn put_dword(&mut self,x: u32) {
        for by in u32::to_le_bytes(x) {
            self.put_byte(by);
        }
    }
    /// output a byte outside the bit stream, not counted as compressed data
    pub fn put_raw(&mut self,by: u8) {
        self.put_byte(by);
    }
    /// overwrite a dword that was previously written, parts that never fit are skipped
    pub fn patch_dword(&mut self,offset: usize,x: u32) {
        for (i,by) in u32::to_le_bytes(x).into_iter().enumerate() {
            if let Some(slot) = self.buf.get_mut(offset + i) {
                *slot = by;
            }
        }
    }
    /// bytes produced by the bit stream so far
    pub fn comp_size(&self) -> usize {
        self.comp_size
    }
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[test]
fn msb_first() {
    let mut w = BitWriter::create(16);
    w.put_bits(3,0b101u8);
    w.put_bits(9,0b0_1100_1111u16);
    w.put_bits(16,0xabcdu16);
    w.flush();
    // 101 011001111 1010101111001101 + 4 pad bits
    assert_eq!(w.comp_size(),4);
    assert_eq!(w.into_inner(),vec![0b1010_1100,0b1111_1010,0b1011_1100,0b1101_0000]);
}

#[test]
fn flush_on_boundary() {
    let mut w = BitWriter::create(16);
    w.put_bits(16,0x1234u16);
    w.flush();
    assert_eq!(w.comp_size(),2);
    assert_eq!(w.into_inner(),vec![0x12,0x34]);
}

#[test]
fn wide_fields() {
    let mut w = BitWriter::create(16);
    w.put_bits(4,0xfu8);
    w.put_bits(18,0x2aaaau32);
    w.flush();
    // 1111 101010101010101010 + 2 pad bits
    assert_eq!(w.comp_size(),3);
    assert_eq!(w.into_inner(),vec![0xfa,0xaa,0xa8]);
}

#[test]
fn bounded_but_counting() {
    let mut w = BitWriter::create(3);
    w.put_dword(0);
    w.put_bits(16,0xffffu16);
    w.put_bits(16,0xffffu16);
    assert_eq!(w.comp_size(),4);
    w.patch_dword(0,0x04030201);
    assert_eq!(w.into_inner(),vec![1,2,3]);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn value_must_fit() {
    let mut w = BitWriter::create(16);
    w.put_bits(4,0x1fu8);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic]
fn negative_value_rejected() {
    let mut w = BitWriter::create(16);
    w.put_bits(8,-1i32);
}
