//! Positioned reads against a shared file handle.
//!
//! Every read names its absolute offset, so concurrent readers never touch a
//! shared cursor. Where the platform has no positioned read, seek+read pairs
//! are serialized behind a lock.

use std::fs::File;
use std::io;

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
#[cfg(not(any(unix, windows)))]
use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct PositionedFile {
    file: File,
    len: u64,
    #[cfg(not(any(unix, windows)))]
    cursor: Mutex<()>,
}

impl PositionedFile {
    pub fn new(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            #[cfg(not(any(unix, windows)))]
            cursor: Mutex::new(()),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn into_inner(self) -> File {
        self.file
    }

    #[cfg(unix)]
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    pub fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    buf = &mut std::mem::take(&mut buf)[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        use std::io::{Read, Seek, SeekFrom};

        let _guard = self.cursor.lock();
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    pub fn read_i32_at(&self, offset: u64) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact_at(&mut buf, offset)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_i64_at(&self, offset: u64) -> io::Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact_at(&mut buf, offset)?;
        Ok(i64::from_be_bytes(buf))
    }

    pub fn read_vec_at(&self, len: usize, offset: u64) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_positioned_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(&7i32.to_be_bytes()).unwrap();
        f.write_all(&(-9i64).to_be_bytes()).unwrap();
        f.write_all(b"tail").unwrap();
        drop(f);

        let pf = PositionedFile::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(pf.len(), 16);
        // Out of order on purpose: no implicit cursor.
        assert_eq!(pf.read_vec_at(4, 12).unwrap(), b"tail");
        assert_eq!(pf.read_i64_at(4).unwrap(), -9);
        assert_eq!(pf.read_i32_at(0).unwrap(), 7);

        let past_end = pf.read_i64_at(12).unwrap_err();
        assert_eq!(past_end.kind(), io::ErrorKind::UnexpectedEof);
    }
}
