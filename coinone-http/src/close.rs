//! Scoped release of closeable resources
//!
//! A resource is closed on every exit path of the operation that uses it.
//! Which close failure reaches the caller is decided by a [`ClosePolicy`]:
//! a failed operation always reports its own error, a close error can only
//! surface when the operation itself succeeded.

use std::io::{self, BufReader, Read};

use tracing::warn;

use crate::{RequestError, RequestResult};

/// Resources released by [`using`]
pub trait Closeable {
    fn close(&mut self) -> io::Result<()>;
}

impl<R: Read + Closeable> Closeable for BufReader<R> {
    fn close(&mut self) -> io::Result<()> {
        self.get_mut().close()
    }
}

/// What to do with an error raised while closing a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Log and drop close errors
    #[default]
    Ignore,
    /// Report a close error when nothing failed before it
    Propagate,
}

impl ClosePolicy {
    /// `Ignore` when `ignore` is true, `Propagate` otherwise
    pub fn from_ignore_flag(ignore: bool) -> Self {
        if ignore {
            ClosePolicy::Ignore
        } else {
            ClosePolicy::Propagate
        }
    }

    /// Combine the outcome of an operation with the outcome of closing
    pub fn settle<T>(self, primary: RequestResult<T>, closed: io::Result<()>) -> RequestResult<T> {
        match (primary, closed) {
            (Err(e), Err(close_error)) => {
                warn!("Close failed after an earlier error: {}", close_error);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
            (Ok(value), Err(close_error)) => match self {
                ClosePolicy::Ignore => {
                    warn!("Ignoring close error: {}", close_error);
                    Ok(value)
                }
                ClosePolicy::Propagate => Err(RequestError::Transport(close_error)),
            },
        }
    }
}

/// Run `op` against `resource`, then close it regardless of the outcome
pub fn using<R, T, F>(mut resource: R, policy: ClosePolicy, op: F) -> RequestResult<T>
where
    R: Closeable,
    F: FnOnce(&mut R) -> RequestResult<T>,
{
    let primary = op(&mut resource);
    let closed = resource.close();
    policy.settle(primary, closed)
}
