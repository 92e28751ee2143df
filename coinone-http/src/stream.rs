//! Response body streams

use std::fmt;
use std::io::{self, Read};

use flate2::read::GzDecoder;

use crate::close::Closeable;
use crate::connection::BodySource;

/// A response body, optionally gzip-decoded on the fly
pub struct ResponseStream {
    inner: Inner,
}

enum Inner {
    Plain(Box<dyn BodySource>),
    Gzip(GzDecoder<Box<dyn BodySource>>),
}

impl ResponseStream {
    pub fn plain(source: Box<dyn BodySource>) -> Self {
        Self { inner: Inner::Plain(source) }
    }

    pub fn gzip(source: Box<dyn BodySource>) -> Self {
        Self { inner: Inner::Gzip(GzDecoder::new(source)) }
    }

    /// A stream with no content
    pub fn empty() -> Self {
        Self::plain(Box::new(io::empty()))
    }

    pub fn is_gzip(&self) -> bool {
        matches!(self.inner, Inner::Gzip(_))
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream").field("gzip", &self.is_gzip()).finish()
    }
}

impl Read for ResponseStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(source) => source.read(buf),
            Inner::Gzip(decoder) => decoder.read(buf),
        }
    }
}

impl Closeable for ResponseStream {
    fn close(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Plain(source) => source.close(),
            Inner::Gzip(decoder) => decoder.get_mut().close(),
        }
    }
}
