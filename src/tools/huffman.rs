//! Static Huffman coding with code lengths limited to 16 bits.
//! This is used by the `tiano` module, one set of trees is built per block.
//!
//! The symbol ordering used to hand out lengths is the order in which leaves come
//! off the heap, not a sort by frequency.  This has to be kept exactly or the
//! output will not match other implementations of the format.

use crate::Error;
use super::bit_reader::BitReader;
use super::try_alloc;

/// longest code that can be written
pub const MAX_CODE_LEN: usize = 16;

/// Working storage for building trees.  The arrays are sized for the largest
/// alphabet, and reused for every alphabet in every block.
pub struct TreeBuilder {
    heap: Vec<usize>,
    heap_size: usize,
    left: Vec<usize>,
    right: Vec<usize>,
    /// number of symbols at each code length, index 0 is unused
    len_cnt: [u16;MAX_CODE_LEN+1]
}

impl TreeBuilder {
    /// `max_symbols` is the size of the largest alphabet that will be coded
    pub fn create(max_symbols: usize) -> Result<Self,Error> {
        Ok(Self {
            heap: try_alloc(max_symbols+1,0)?,
            heap_size: 0,
            left: try_alloc(2*max_symbols-1,0)?,
            right: try_alloc(2*max_symbols-1,0)?,
            len_cnt: [0;MAX_CODE_LEN+1]
        })
    }
    /// Restore heap order below position `i`, the key is `freq`.
    fn down_heap(&mut self,mut i: usize,freq: &[u16]) {
        let k = self.heap[i];
        loop {
            let mut j = 2*i;
            if j > self.heap_size {
                break;
            }
            if j < self.heap_size && freq[self.heap[j]] > freq[self.heap[j+1]] {
                j += 1;
            }
            if freq[k] <= freq[self.heap[j]] {
                break;
            }
            self.heap[i] = self.heap[j];
            i = j;
        }
        self.heap[i] = k;
    }
    /// Build a tree over the first `n` symbols.  `freq` must have room for the
    /// branch nodes (2n-1), their weights are stored there.  Returns the root,
    /// which is a symbol (< n) if fewer than 2 symbols occur, in which case all
    /// lengths are 0 and the symbol has code 0.
    pub fn make_tree(&mut self,n: usize,freq: &mut [u16],len: &mut [u8],code: &mut [u16]) -> usize {
        let mut avail = n;
        self.heap_size = 0;
        self.heap[1] = 0;
        for i in 0..n {
            len[i] = 0;
            if freq[i] != 0 {
                self.heap_size += 1;
                self.heap[self.heap_size] = i;
            }
        }
        if self.heap_size < 2 {
            code[self.heap[1]] = 0;
            return self.heap[1];
        }
        for i in (1..=self.heap_size/2).rev() {
            self.down_heap(i,freq);
        }
        // leaves in the order they come off the heap
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let root = loop {
            let i = self.heap[1];
            if i < n {
                order.push(i);
            }
            self.heap[1] = self.heap[self.heap_size];
            self.heap_size -= 1;
            self.down_heap(1,freq);
            let j = self.heap[1];
            if j < n {
                order.push(j);
            }
            let k = avail;
            avail += 1;
            freq[k] = freq[i].wrapping_add(freq[j]);
            self.heap[1] = k;
            self.down_heap(1,freq);
            self.left[k] = i;
            self.right[k] = j;
            if self.heap_size <= 1 {
                break k;
            }
        };
        self.make_len(root,n,len,&order);
        make_code(n,len,&self.len_cnt,code);
        root
    }
    fn count_len(&mut self,node: usize,depth: usize,n: usize) {
        if node < n {
            self.len_cnt[depth.min(MAX_CODE_LEN)] += 1;
        } else {
            let (l,r) = (self.left[node],self.right[node]);
            self.count_len(l,depth+1,n);
            self.count_len(r,depth+1,n);
        }
    }
    /// Work out code lengths from the tree, squeezing anything deeper than 16 levels.
    fn make_len(&mut self,root: usize,n: usize,len: &mut [u8],order: &[usize]) {
        self.len_cnt = [0;MAX_CODE_LEN+1];
        self.count_len(root,0,n);
        // Anything deeper than 16 was counted at 16, which overfills the code space.
        // Move leaves down one level at a time until the Kraft sum is exact.
        let mut cum: u32 = 0;
        for i in (1..=MAX_CODE_LEN).rev() {
            cum += (self.len_cnt[i] as u32) << (MAX_CODE_LEN - i);
        }
        while cum != 1 << MAX_CODE_LEN {
            self.len_cnt[MAX_CODE_LEN] = self.len_cnt[MAX_CODE_LEN].wrapping_sub(1);
            for i in (1..MAX_CODE_LEN).rev() {
                if self.len_cnt[i] != 0 {
                    self.len_cnt[i] -= 1;
                    self.len_cnt[i+1] += 2;
                    break;
                }
            }
            cum = cum.wrapping_sub(1);
        }
        // the first leaves off the heap get the longest codes
        let mut leaves = order.iter();
        for i in (1..=MAX_CODE_LEN).rev() {
            for _k in 0..self.len_cnt[i] {
                if let Some(&sym) = leaves.next() {
                    len[sym] = i as u8;
                }
            }
        }
    }
}

/// count the symbols at each length
fn count_lengths(len: &[u8]) -> [u16;MAX_CODE_LEN+1] {
    let mut len_cnt = [0;MAX_CODE_LEN+1];
    for l in len {
        if *l as usize <= MAX_CODE_LEN {
            len_cnt[*l as usize] += 1;
        }
    }
    len_cnt
}

/// Assign canonical codes: shorter codes first, ties broken by symbol value.
fn make_code(n: usize,len: &[u8],len_cnt: &[u16;MAX_CODE_LEN+1],code: &mut [u16]) {
    let mut start = [0u16;MAX_CODE_LEN+2];
    for i in 1..=MAX_CODE_LEN {
        start[i+1] = start[i].wrapping_add(len_cnt[i]) << 1;
    }
    for i in 0..n {
        let l = len[i] as usize;
        code[i] = start[l];
        start[l] = start[l].wrapping_add(1);
    }
}

/// Decoding side of a canonical code, rebuilt from the lengths alone.
pub struct CodeTable {
    /// when only one symbol is in use it takes no bits at all
    single: Option<usize>,
    len_cnt: [u16;MAX_CODE_LEN+1],
    /// symbols in code order
    sorted: Vec<usize>
}

impl CodeTable {
    /// table for an alphabet where only `sym` occurs
    pub fn single(sym: usize) -> Self {
        Self {
            single: Some(sym),
            len_cnt: [0;MAX_CODE_LEN+1],
            sorted: Vec::new()
        }
    }
    /// Build from the code lengths, the lengths must fill the code space exactly.
    pub fn from_lengths(len: &[u8]) -> Result<Self,Error> {
        if len.iter().any(|l| *l as usize > MAX_CODE_LEN) {
            log::error!("code length exceeds {}",MAX_CODE_LEN);
            return Err(Error::FileFormatMismatch);
        }
        let len_cnt = count_lengths(len);
        let mut cum: u32 = 0;
        for i in 1..=MAX_CODE_LEN {
            cum += (len_cnt[i] as u32) << (MAX_CODE_LEN - i);
        }
        if cum != 1 << MAX_CODE_LEN {
            log::error!("code lengths do not form a complete prefix code");
            return Err(Error::FileFormatMismatch);
        }
        let mut sorted = Vec::new();
        for l in 1..=MAX_CODE_LEN {
            for (sym,sym_len) in len.iter().enumerate() {
                if *sym_len as usize == l {
                    sorted.push(sym);
                }
            }
        }
        Ok(Self {
            single: None,
            len_cnt,
            sorted
        })
    }
    /// read one symbol
    pub fn decode(&self,bits: &mut BitReader) -> Result<usize,Error> {
        if let Some(sym) = self.single {
            return Ok(sym);
        }
        // `first` is the first code of the current length, `index` the first symbol
        let mut code: u32 = 0;
        let mut first: u32 = 0;
        let mut index: usize = 0;
        for l in 1..=MAX_CODE_LEN {
            code |= bits.get_bit()?;
            let count = self.len_cnt[l] as u32;
            if code < first + count {
                return Ok(self.sorted[index + (code - first) as usize]);
            }
            index += count as usize;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(Error::FileFormatMismatch)
    }
}

#[cfg(test)]
fn kraft_sum(len: &[u8]) -> u32 {
    len.iter().filter(|l| **l > 0).map(|l| 1u32 << (MAX_CODE_LEN - *l as usize)).sum()
}

#[test]
fn two_symbols() {
    let mut builder = TreeBuilder::create(8).expect("alloc failed");
    let mut freq = vec![0u16;15];
    freq[2] = 1;
    freq[3] = 2;
    let mut len = vec![0u8;8];
    let mut code = vec![0u16;8];
    let root = builder.make_tree(8,&mut freq,&mut len,&mut code);
    assert_eq!(root,8);
    assert_eq!(freq[root],3);
    assert_eq!(len,vec![0,0,1,1,0,0,0,0]);
    assert_eq!(code[2],0);
    assert_eq!(code[3],1);
}

#[test]
fn degenerate_trees() {
    let mut builder = TreeBuilder::create(8).expect("alloc failed");
    let mut len = vec![9u8;8];
    let mut code = vec![9u16;8];
    let mut freq = vec![0u16;15];
    assert_eq!(builder.make_tree(8,&mut freq,&mut len,&mut code),0);
    assert_eq!(code[0],0);
    assert_eq!(len,vec![0;8]);
    freq[5] = 7;
    assert_eq!(builder.make_tree(8,&mut freq,&mut len,&mut code),5);
    assert_eq!(code[5],0);
    assert_eq!(len,vec![0;8]);
}

#[test]
fn canonical_codes() {
    // lengths 1,2,3,3 in symbol order 3,0,1,2
    let len: Vec<u8> = vec![2,3,3,1];
    let mut code = vec![0u16;4];
    make_code(4,&len,&count_lengths(&len),&mut code);
    assert_eq!(code,vec![0b10,0b110,0b111,0b0]);
}

#[test]
fn lengths_are_limited() {
    // Fibonacci weights produce a tree 19 levels deep
    let n = 20;
    let mut builder = TreeBuilder::create(n).expect("alloc failed");
    let mut freq = vec![0u16;2*n-1];
    let (mut a,mut b) = (1u16,1u16);
    for i in 0..n {
        freq[i] = a;
        (a,b) = (b,a+b);
    }
    let mut len = vec![0u8;n];
    let mut code = vec![0u16;n];
    builder.make_tree(n,&mut freq,&mut len,&mut code);
    assert!(len.iter().all(|l| *l as usize <= MAX_CODE_LEN && *l > 0));
    assert_eq!(kraft_sum(&len),1 << MAX_CODE_LEN);
    // most frequent symbol gets the shortest code
    assert_eq!(len[n-1],1);
    // codes must be decodable from the lengths alone
    let table = CodeTable::from_lengths(&len).expect("bad lengths");
    let mut w = super::bit_writer::BitWriter::create(64);
    for sym in 0..n {
        w.put_bits(len[sym] as usize,code[sym]);
    }
    w.flush();
    let mut r = BitReader::create(&w.into_inner());
    for sym in 0..n {
        assert_eq!(table.decode(&mut r),Ok(sym));
    }
}

#[test]
fn skewed_block() {
    let n = 510;
    let mut builder = TreeBuilder::create(n).expect("alloc failed");
    let mut freq = vec![0u16;2*n-1];
    for i in 0..n {
        freq[i] = ((i * 7919) % 61) as u16;
    }
    freq[65] = 4000;
    let mut len = vec![0u8;n];
    let mut code = vec![0u16;n];
    builder.make_tree(n,&mut freq,&mut len,&mut code);
    assert_eq!(kraft_sum(&len),1 << MAX_CODE_LEN);
    for i in 0..n {
        assert_eq!(len[i] == 0,freq[i] == 0);
    }
}

#[test]
fn incomplete_lengths_rejected() {
    assert!(CodeTable::from_lengths(&[1,2,0]).is_err());
    assert!(CodeTable::from_lengths(&[1,1,1]).is_err());
    assert!(CodeTable::from_lengths(&[1,2,2]).is_ok());
}

#[test]
fn ties_keep_heap_order() {
    // with equal weights the symbol already higher in the heap is taken first,
    // other tie breaks give a different set of optimal lengths
    let n = 5;
    let mut builder = TreeBuilder::create(n).expect("alloc failed");
    let mut freq = vec![0u16;2*n-1];
    freq[..n].copy_from_slice(&[2,3,0,2,1]);
    let mut len = vec![0u8;n];
    let mut code = vec![0u16;n];
    let root = builder.make_tree(n,&mut freq,&mut len,&mut code);
    assert_eq!(freq[root],8);
    assert_eq!(len,vec![3,1,0,2,3]);
    assert_eq!(code,vec![0b110,0b0,0,0b10,0b111]);
}

#[test]
fn oversized_alphabet_fails() {
    assert!(TreeBuilder::create(usize::MAX / 4).is_err());
}
