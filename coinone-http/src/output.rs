//! Buffered, charset-aware request body writer

use std::fmt;
use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;

use crate::charset::Charset;
use crate::close::Closeable;
use crate::connection::BodySink;
use crate::progress::UploadProgress;
use crate::RequestResult;

/// Accumulates request body bytes before they reach the transport.
///
/// Every chunk written is counted and reported to the upload progress
/// callback. Closing flushes the buffer and finishes the transport body.
pub struct RequestOutput {
    writer: BufWriter<Box<dyn BodySink>>,
    charset: Charset,
    written: u64,
    total: Option<u64>,
    progress: Arc<dyn UploadProgress>,
}

impl fmt::Debug for RequestOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOutput")
            .field("charset", &self.charset)
            .field("written", &self.written)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl RequestOutput {
    pub fn new(
        sink: Box<dyn BodySink>,
        charset: Charset,
        buffer_size: usize,
        progress: Arc<dyn UploadProgress>,
        total: Option<u64>,
    ) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, sink),
            charset,
            written: 0,
            total,
            progress,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Total bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn set_progress(&mut self, progress: Arc<dyn UploadProgress>) {
        self.progress = progress;
    }

    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        self.progress.on_upload(self.written, self.total);
        Ok(())
    }

    /// Write text encoded in the output's charset
    pub fn write_str(&mut self, text: &str) -> RequestResult<()> {
        let bytes = self.charset.encode(text)?;
        self.write_bytes(&bytes)?;
        Ok(())
    }

    /// Copy `reader` to the body in chunks of `chunk_size`
    pub fn copy_from<R: Read>(&mut self, reader: &mut R, chunk_size: usize) -> io::Result<u64> {
        let mut buffer = vec![0u8; chunk_size];
        let mut copied = 0;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => return Ok(copied),
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.write_bytes(&buffer[..read])?;
            copied += read as u64;
        }
    }
}

impl Closeable for RequestOutput {
    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_mut().close()
    }
}
