//! Memory-mapped file source.

use std::fs::File;
use std::path::Path;

use eyre::{ensure, Context, Result};
use memmap2::Mmap;

use super::BufferSource;
use crate::ByteRange;

/// Read-only file provider serving fills straight out of an mmap.
///
/// Logical offset 0 of the source is byte 0 of the file; the source limits
/// itself to `[0, file_len)` on conversion, so a buffer paged from it can
/// never request bytes past the end of the file.
pub struct FileSource {
    map: Option<Mmap>,
    len: usize,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("failed to open source file '{}'", path.display()))?;
        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();
        let len = usize::try_from(len).wrap_err("source file too large to map")?;

        // Mapping a zero-length file is an error on several platforms; an
        // empty file simply has no bytes to serve.
        let map = if len == 0 {
            None
        } else {
            // SAFETY: Mmap::map is unsafe because the mapping becomes
            // inconsistent if the underlying file is truncated concurrently.
            // The source contract is single-process, read-only access to a
            // file that is not modified while buffers page from it.
            let map = unsafe { Mmap::map(&file) }
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?;
            Some(map)
        };

        Ok(Self { map, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Converts into a [`BufferSource`] limited to the file's byte range.
    pub fn into_source(self) -> Result<BufferSource> {
        let len = self.len;
        let mut source = match self.map {
            None => BufferSource::empty(),
            Some(map) => BufferSource::with_fill(move |dst, range| {
                ensure!(range.start >= 0, "file fill range {range} starts before 0");
                let start = range.start as usize;
                let end = start + dst.len();
                ensure!(
                    end <= map.len(),
                    "file fill range {range} past end of {} byte file",
                    map.len()
                );
                dst.copy_from_slice(&map[start..end]);
                Ok(())
            }),
        };
        source.set_limit(ByteRange::new(0, len as i64))?;
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn serves_file_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 10);
        let mut source = source.into_source().unwrap();
        assert_eq!(source.limit(), Some(ByteRange::new(0, 10)));

        let mut dst = [0u8; 4];
        source.fill(&mut dst, ByteRange::new(3, 7)).unwrap();
        assert_eq!(&dst, b"3456");
    }

    #[test]
    fn fill_past_file_end_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        let mut source = FileSource::open(file.path()).unwrap().into_source().unwrap();
        let mut dst = [0u8; 4];
        assert!(source.fill(&mut dst, ByteRange::new(0, 4)).is_err());
    }

    #[test]
    fn empty_file_maps_to_empty_source() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = FileSource::open(file.path()).unwrap();
        assert!(source.is_empty());

        let source = source.into_source().unwrap();
        assert!(!source.has_provider());
        assert_eq!(source.limit(), Some(ByteRange::new(0, 0)));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileSource::open("/nonexistent/pagebuf-source").is_err());
    }
}
