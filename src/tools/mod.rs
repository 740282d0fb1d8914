//! Components shared by the codecs

pub mod bit_writer;
pub mod bit_reader;
pub mod huffman;
pub mod match_finder;

use crate::Error;

/// allocate a filled array, failing gracefully if memory is short
pub fn try_alloc<T: Clone>(n: usize,fill: T) -> Result<Vec<T>,Error> {
    let mut ans = Vec::new();
    ans.try_reserve_exact(n).map_err(|_| Error::OutOfResources)?;
    ans.resize(n,fill);
    Ok(ans)
}

#[test]
fn huge_alloc_fails() {
    assert_eq!(try_alloc(usize::MAX / 2,0u64),Err(Error::OutOfResources));
    assert_eq!(try_alloc(3,7u8),Ok(vec![7,7,7]));
}
