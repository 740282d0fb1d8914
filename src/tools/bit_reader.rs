//! MSB first bit input for the expansion side

use bit_vec::BitVec;
use crate::Error;

pub struct BitReader {
    bits: BitVec,
    ptr: usize
}

impl BitReader {
    pub fn create(dat: &[u8]) -> Self {
        Self {
            bits: BitVec::from_bytes(dat),
            ptr: 0
        }
    }
    /// get the next bit, running off the end is an error
    pub fn get_bit(&mut self) -> Result<u32,Error> {
        match self.bits.get(self.ptr) {
            Some(bit) => {
                self.ptr += 1;
                Ok(bit as u32)
            },
            None => {
                log::error!("bit stream ended at {}",self.ptr);
                Err(Error::FileFormatMismatch)
            }
        }
    }
    /// get the next `n` bits as an unsigned value, first bit is most significant
    pub fn get_bits(&mut self,n: usize) -> Result<u32,Error> {
        let mut ans = 0;
        for _i in 0..n {
            ans <<= 1;
            ans |= self.get_bit()?;
        }
        Ok(ans)
    }
    /// number of bits consumed so far
    pub fn consumed(&self) -> usize {
        self.ptr
    }
}

#[test]
fn read_bits() {
    let mut r = BitReader::create(&[0b1010_1100,0xff]);
    assert_eq!(r.get_bits(3),Ok(0b101));
    assert_eq!(r.get_bits(9),Ok(0b0_1100_1111));
    assert_eq!(r.get_bits(4),Ok(0xf));
    assert_eq!(r.consumed(),16);
    assert_eq!(r.get_bit(),Err(Error::FileFormatMismatch));
}
