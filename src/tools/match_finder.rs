//! Sliding window and string index for the LZ77 stage.
//!
//! The index is a Patricia tree per leading byte.  Every window position is a leaf,
//! branch nodes record how many bytes have matched (`level`) and the most recent
//! position passing through them (`position`).  Children are found by hashing the
//! parent together with the edge byte, siblings with the same hash are kept in
//! doubly linked lists threaded through `next` and `prev`.
//!
//! All node handles are indices into one arena:
//! * `1..W` are split nodes, handed out from a free list
//! * `W..2W` are leaves, the handle is the position in the window buffer
//! * `2W..2W+256` are the roots, one per byte value
//! * anything above is a hash bucket, which only appears in `next` and `prev`

use crc::{Crc,Digest,CRC_16_ARC};
use crate::{Error,Options};
use super::try_alloc;

/// minimum string length that will be tokenized
pub const THRESHOLD: usize = 3;
/// longest string that will be tokenized
pub const MAX_MATCH: usize = 256;
/// set on a cached position that was pushed up from below rather than seen directly
const PERC_FLAG: usize = 1 << 31;
const NIL: usize = 0;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub enum NodeKind {
    Split,
    Leaf,
    Root
}

pub struct MatchFinder<'a> {
    src: &'a [u8],
    src_ptr: usize,
    wnd_bit: usize,
    wnd_size: usize,
    short_match_reach: Option<usize>,
    /// window buffer, the back half is history, the front half plus MAX_MATCH is lookahead
    pub text: Vec<u8>,
    level: Vec<usize>,
    child_count: Vec<usize>,
    position: Vec<usize>,
    parent: Vec<usize>,
    prev: Vec<usize>,
    next: Vec<usize>,
    /// head of the free list of split nodes
    avail: usize,
    /// current position in `text`, always in W..2W
    pub pos: usize,
    /// bytes of input from `pos` to the end
    pub remainder: usize,
    pub match_len: usize,
    pub match_pos: usize,
    orig_size: usize,
    crc: Digest<'static,u16>
}

impl <'a> MatchFinder<'a> {
    pub fn create(src: &'a [u8],opt: &Options) -> Result<Self,Error> {
        let wnd_size = 1 << opt.window_bits;
        let roots = 2 * wnd_size;
        let nodes = roots + 256;
        let slots = nodes + nodes + (255 << (opt.window_bits - 9)) + 1;
        let mut ans = Self {
            src,
            src_ptr: 0,
            wnd_bit: opt.window_bits,
            wnd_size,
            short_match_reach: opt.short_match_reach,
            text: try_alloc(2 * wnd_size + MAX_MATCH,0)?,
            level: try_alloc(nodes,0)?,
            child_count: try_alloc(nodes,0)?,
            position: try_alloc(nodes,NIL)?,
            parent: try_alloc(nodes,NIL)?,
            prev: try_alloc(slots,NIL)?,
            next: try_alloc(slots,NIL)?,
            avail: 1,
            pos: 0,
            remainder: 0,
            match_len: 0,
            match_pos: 0,
            orig_size: 0,
            crc: CRC16.digest()
        };
        ans.init_slide();
        Ok(ans)
    }
    fn init_slide(&mut self) {
        for c in 0..256 {
            let root = self.root(c as u8);
            self.level[root] = 1;
            self.position[root] = NIL;
        }
        // chain the split nodes into the free list
        self.avail = 1;
        for i in 1..self.wnd_size - 1 {
            self.next[i] = i + 1;
        }
        self.next[self.wnd_size - 1] = NIL;
    }
    fn kind(&self,node: usize) -> NodeKind {
        if node < self.wnd_size {
            NodeKind::Split
        } else if node < 2 * self.wnd_size {
            NodeKind::Leaf
        } else {
            NodeKind::Root
        }
    }
    fn root(&self,c: u8) -> usize {
        2 * self.wnd_size + c as usize
    }
    fn hash(&self,node: usize,c: u8) -> usize {
        self.level.len() + node + ((c as usize) << (self.wnd_bit - 9))
    }
    /// Copy up to `n` bytes of input into the window at `offset`, returns the count.
    fn read_window(&mut self,offset: usize,n: usize) -> usize {
        let count = n.min(self.src.len() - self.src_ptr);
        let chunk = &self.src[self.src_ptr..self.src_ptr+count];
        self.text[offset..offset+count].copy_from_slice(chunk);
        self.crc.update(chunk);
        self.src_ptr += count;
        self.orig_size += count;
        count
    }
    /// bytes of input consumed so far
    pub fn orig_size(&self) -> usize {
        self.orig_size
    }
    /// CRC-16 of the bytes consumed so far
    pub fn crc(&self) -> u16 {
        self.crc.clone().finalize()
    }
    /// Find the child of `q` along edge `c`, or NIL.
    /// The child for a given parent and byte is unique, so bucket order does not matter.
    fn child(&self,q: usize,c: u8) -> usize {
        let mut r = self.next[self.hash(q,c)];
        while r != NIL && self.parent[r] != q {
            r = self.next[r];
        }
        r
    }
    /// Attach `r` to `q` along edge `c`, it goes to the front of the bucket.
    fn make_child(&mut self,q: usize,c: u8,r: usize) {
        let h = self.hash(q,c);
        let t = self.next[h];
        self.next[h] = r;
        self.next[r] = t;
        self.prev[t] = r;
        self.prev[r] = h;
        self.parent[r] = q;
        self.child_count[q] += 1;
    }
    /// Insert a branch above `old` at the point where the current string diverges
    /// from it, the current position becomes its other child.
    fn split(&mut self,old: usize) {
        let new = self.avail;
        self.avail = self.next[new];
        self.child_count[new] = 0;
        // new takes the place of old in the sibling list
        let t = self.prev[old];
        self.prev[new] = t;
        self.next[t] = new;
        let t = self.next[old];
        self.next[new] = t;
        self.prev[t] = new;
        self.parent[new] = self.parent[old];
        self.level[new] = self.match_len;
        self.position[new] = self.pos;
        self.make_child(new,self.text[self.match_pos + self.match_len],old);
        self.make_child(new,self.text[self.pos + self.match_len],self.pos);
    }
    /// Index the string at `pos`, leaving the longest earlier match in
    /// `match_len` and `match_pos`.
    pub fn insert_node(&mut self) {
        let mut q: usize;
        let mut r: usize;
        if self.match_len >= 4 {
            // After a long match the string at `pos` shares all but its first byte with
            // the string after the match.  Start from that leaf and climb to a branch
            // short enough to be valid here.
            self.match_len -= 1;
            r = (self.match_pos + 1) | self.wnd_size;
            loop {
                q = self.parent[r];
                if q != NIL {
                    break;
                }
                // this leaf was replaced, `next` leads to the replacement
                r = self.next[r];
            }
            while self.level[q] >= self.match_len {
                r = q;
                q = self.parent[q];
            }
            let mut t = q;
            while self.position[t] & PERC_FLAG != 0 {
                self.position[t] = self.pos;
                t = self.parent[t];
            }
            if self.kind(t) == NodeKind::Split {
                self.position[t] = self.pos | PERC_FLAG;
            }
        } else {
            q = self.root(self.text[self.pos]);
            let c = self.text[self.pos + 1];
            r = self.child(q,c);
            if r == NIL {
                self.make_child(q,c,self.pos);
                self.match_len = 1;
                return;
            }
            self.match_len = 2;
        }
        // walk down, updating positions along the way
        loop {
            let j = match self.kind(r) {
                NodeKind::Leaf => {
                    self.match_pos = r;
                    MAX_MATCH
                },
                _ => {
                    self.match_pos = self.position[r] & !PERC_FLAG;
                    self.level[r]
                }
            };
            if self.match_pos >= self.pos {
                self.match_pos -= self.wnd_size;
            }
            while self.match_len < j {
                if self.text[self.pos + self.match_len] != self.text[self.match_pos + self.match_len] {
                    self.split(r);
                    return;
                }
                self.match_len += 1;
            }
            if self.match_len >= MAX_MATCH {
                break;
            }
            self.position[r] = self.pos;
            q = r;
            let c = self.text[self.pos + self.match_len];
            r = self.child(q,c);
            if r == NIL {
                self.make_child(q,c,self.pos);
                return;
            }
            self.match_len += 1;
        }
        // Full length match with leaf `r`, the current position replaces it.
        let t = self.prev[r];
        self.prev[self.pos] = t;
        self.next[t] = self.pos;
        let t = self.next[r];
        self.next[self.pos] = t;
        self.prev[t] = self.pos;
        self.parent[self.pos] = q;
        self.parent[r] = NIL;
        self.next[r] = self.pos;
    }
    /// Remove the leaf for the position that is leaving the window.  If its parent is
    /// left with a single child the parent is merged away and recycled.
    fn delete_node(&mut self) {
        if self.parent[self.pos] == NIL {
            return;
        }
        let r = self.prev[self.pos];
        let s = self.next[self.pos];
        self.next[r] = s;
        self.prev[s] = r;
        let r = self.parent[self.pos];
        self.parent[self.pos] = NIL;
        if self.kind(r) == NodeKind::Root {
            return;
        }
        self.child_count[r] -= 1;
        if self.child_count[r] > 1 {
            return;
        }
        let mut t = self.position[r] & !PERC_FLAG;
        if t >= self.pos {
            t -= self.wnd_size;
        }
        // percolate the newest position up through flagged ancestors
        let mut s = t;
        let mut q = self.parent[r];
        let mut u;
        loop {
            u = self.position[q];
            if u & PERC_FLAG == 0 {
                break;
            }
            u &= !PERC_FLAG;
            if u >= self.pos {
                u -= self.wnd_size;
            }
            if u > s {
                s = u;
            }
            self.position[q] = s | self.wnd_size;
            q = self.parent[q];
        }
        if self.kind(q) == NodeKind::Split {
            if u >= self.pos {
                u -= self.wnd_size;
            }
            if u > s {
                s = u;
            }
            self.position[q] = s | self.wnd_size | PERC_FLAG;
        }
        // the remaining child takes the place of r
        let s = self.child(r,self.text[t + self.level[r]]);
        let t = self.prev[s];
        let u = self.next[s];
        self.next[t] = u;
        self.prev[u] = t;
        let t = self.prev[r];
        self.next[t] = s;
        self.prev[s] = t;
        let t = self.next[r];
        self.prev[t] = s;
        self.next[s] = t;
        self.parent[s] = self.parent[r];
        self.parent[r] = NIL;
        self.next[r] = self.avail;
        self.avail = r;
    }
    /// Fill the window and index the first position.
    pub fn prime(&mut self) {
        self.remainder = self.read_window(self.wnd_size,self.wnd_size + MAX_MATCH);
        self.match_len = 0;
        self.pos = self.wnd_size;
        self.insert_node();
        self.clamp_match();
    }
    /// A match cannot run past the end of the input.  A match of the minimum length
    /// is dropped if it reaches back too far.
    pub fn clamp_match(&mut self) {
        if self.match_len > self.remainder {
            self.match_len = self.remainder;
        }
        if let Some(reach) = self.short_match_reach {
            if self.match_len == THRESHOLD && self.pos - self.match_pos > reach {
                self.match_len = THRESHOLD - 1;
            }
        }
    }
    /// Advance one position, sliding the window when the cursor reaches the end.
    pub fn get_next_match(&mut self) {
        self.remainder -= 1;
        self.pos += 1;
        if self.pos == 2 * self.wnd_size {
            // bytes past the end of input are left as they are
            self.text.copy_within(self.wnd_size..2 * self.wnd_size + MAX_MATCH,0);
            let n = self.read_window(self.wnd_size + MAX_MATCH,self.wnd_size);
            self.remainder += n;
            self.pos = self.wnd_size;
            log::trace!("window slide, read {} more bytes",n);
        }
        self.delete_node();
        self.insert_node();
    }
    /// distance code for a match found at `match_pos` while the cursor was at `pos - 1`
    pub fn distance(&self,match_pos: usize) -> usize {
        (self.pos as isize - match_pos as isize - 2) as usize & (self.wnd_size - 1)
    }
}

#[cfg(test)]
fn ensure_tree(finder: &MatchFinder) {
    // every attached leaf is in the bucket of its parent, under the byte at the parent's depth
    for leaf in finder.wnd_size..2*finder.wnd_size {
        let q = finder.parent[leaf];
        if q == NIL {
            continue;
        }
        let depth = match finder.kind(q) {
            NodeKind::Root => 1,
            _ => finder.level[q]
        };
        let mut text_pos = leaf;
        if text_pos > finder.pos {
            text_pos -= finder.wnd_size;
        }
        assert_eq!(finder.child(q,finder.text[text_pos + depth]),leaf);
    }
}

#[test]
fn finds_repeat() {
    let src = "abcdabcd".as_bytes();
    let mut finder = MatchFinder::create(src,&crate::STD_OPTIONS).expect("alloc failed");
    let w = finder.wnd_size;
    finder.prime();
    assert_eq!(finder.match_len,1);
    for _i in 0..3 {
        finder.get_next_match();
        assert_eq!(finder.match_len,1);
    }
    finder.get_next_match();
    finder.clamp_match();
    assert_eq!(finder.pos,w + 4);
    assert_eq!(finder.remainder,4);
    assert_eq!(finder.match_len,4);
    assert_eq!(finder.match_pos,w);
    ensure_tree(&finder);
}

#[test]
fn long_run_uses_shortcut() {
    let src = vec![b'A';1000];
    let mut finder = MatchFinder::create(&src,&crate::STD_OPTIONS).expect("alloc failed");
    finder.prime();
    finder.get_next_match();
    // second position matches the first, out to the lookahead limit
    assert_eq!(finder.match_len,MAX_MATCH);
    assert_eq!(finder.match_pos,finder.wnd_size);
    for _i in 0..100 {
        finder.get_next_match();
        assert_eq!(finder.match_len,MAX_MATCH);
        assert_eq!(finder.match_pos,finder.pos - 1);
    }
    ensure_tree(&finder);
}

#[test]
fn window_slides() {
    let mut src = Vec::new();
    let mut x: u32 = 12345;
    for _i in 0..20000 {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        src.push(b'a' + ((x >> 16) % 4) as u8);
    }
    let mut finder = MatchFinder::create(&src,&crate::STD_OPTIONS).expect("alloc failed");
    let w = finder.wnd_size;
    finder.prime();
    let mut abs = 0;
    while finder.remainder > 1 {
        finder.get_next_match();
        finder.clamp_match();
        abs += 1;
        assert!(finder.pos >= w && finder.pos < 2 * w);
        assert_eq!(finder.text[finder.pos],src[abs]);
        if finder.match_len >= THRESHOLD {
            let dist = finder.pos - finder.match_pos;
            assert!(dist > 0 && dist < w);
            assert_eq!(src[abs-dist..abs-dist+finder.match_len],src[abs..abs+finder.match_len]);
        }
    }
    assert_eq!(finder.orig_size(),src.len());
    assert_eq!(finder.crc(),CRC16.checksum(&src));
    ensure_tree(&finder);
}

#[test]
fn far_short_match_dropped() {
    let mut src = b"abc".to_vec();
    src.extend_from_slice(&[b'q';3000]);
    src.extend_from_slice(b"abcd");
    for (opt,expected) in [(crate::STD_OPTIONS,THRESHOLD),(crate::TIANO_OPTIONS,THRESHOLD-1)] {
        let mut finder = MatchFinder::create(&src,&opt).expect("alloc failed");
        finder.prime();
        for _i in 0..3003 {
            finder.get_next_match();
            finder.clamp_match();
        }
        // "abc" is 3003 bytes back
        assert_eq!(finder.text[finder.pos],b'a');
        assert_eq!(finder.match_len,expected);
    }
}
