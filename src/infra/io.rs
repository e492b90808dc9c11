use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl FileContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Mapped(mmap) => mmap,
            FileContent::Buffered(buf) => buf,
        }
    }

    /// Invalid UTF-8 is replaced, never rejected
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)?;

    if metadata.len() > MMAP_THRESHOLD {
        let file = File::open(path)?;

        // Safety: read-only map of an existing regular file
        let mmap = unsafe { Mmap::map(&file) }?;

        Ok(FileContent::Mapped(mmap))
    } else {
        Ok(FileContent::Buffered(std::fs::read(path)?))
    }
}

/// Read a file as text with lossy decoding.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    Ok(read_file_smart(path)?.text().into_owned())
}

/// First `max` lines, lossily decoded, without trailing newlines.
/// The handle is closed before returning.
pub fn read_head_lines<P: AsRef<Path>>(path: P, max: usize) -> Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::with_capacity(max.min(64));
    let mut buf = Vec::new();

    while lines.len() < max {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(lines)
}

/// `blake3:<hex>` digest of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(bytes).to_hex())
}
