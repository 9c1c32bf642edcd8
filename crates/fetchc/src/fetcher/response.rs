use std::fs::File;
use std::io::{self, Cursor, Read};

use bytes::Bytes;

/// Body of a loaded resource
#[derive(Debug)]
pub enum ResponseBody {
    /// Blob opened from the disk cache
    File(File),
    /// Freshly fetched body
    Memory(Cursor<Bytes>),
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ResponseBody::File(file) => file.read(buf),
            ResponseBody::Memory(cursor) => cursor.read(buf),
        }
    }
}

/// Result of a successful [`Fetcher::load`](super::Fetcher::load)
#[derive(Debug)]
pub struct LoadResponse {
    pub body: ResponseBody,
    /// Whether the body is served from the disk cache
    pub from_cache: bool,
    /// Body length in bytes
    pub length: u64,
}

impl LoadResponse {
    pub(crate) fn cached(file: File, length: u64) -> Self {
        Self {
            body: ResponseBody::File(file),
            from_cache: true,
            length,
        }
    }

    pub(crate) fn fetched(body: Bytes) -> Self {
        Self {
            length: body.len() as u64,
            body: ResponseBody::Memory(Cursor::new(body)),
            from_cache: false,
        }
    }

    /// Read the whole body into memory
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.length as usize);
        self.body.read_to_end(&mut data)?;
        Ok(data)
    }
}
