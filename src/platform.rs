//! # Platform Module
//!
//! The small set of host services the database engine needs: opening data
//! files, reading whole blocks at absolute offsets, and file sizes.
//! Positioned reads go through `positioned_io::ReadAt`, so no file cursor
//! is shared between reader threads.

use positioned_io::ReadAt;
use std::fs::File;
use std::io;
use std::path::Path;

/// Cache buffers are sized and aligned in units of this.
pub const PAGE_SIZE: usize = 4096;

pub fn open_file(path: &Path) -> io::Result<File> {
    File::open(path)
}

pub fn file_size(file: &File) -> io::Result<u64> {
    Ok(file.metadata()?.len())
}

pub fn file_size_of(path: &Path) -> io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Read `buf.len()` bytes at `offset`.  A read past end of file fills the
/// tail of `buf` with zeros, which is what block-granular callers want for
/// the final partial block of a file.
pub fn pread(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let mut done = 0;
    while done < buf.len() {
        let n = file.read_at(offset + done as u64, &mut buf[done..])?;
        if n == 0 {
            for b in &mut buf[done..] {
                *b = 0;
            }
            return Ok(());
        }
        done += n;
    }
    Ok(())
}

/// Read a whole file, padded up to a multiple of `block_size`.
pub fn read_padded(file: &File, block_size: usize) -> io::Result<Vec<u8>> {
    let size = file_size(file)? as usize;
    let padded = size.div_ceil(block_size) * block_size;
    let mut buf = vec![0u8; padded];
    pread(file, 0, &mut buf[..])?;
    Ok(buf)
}
