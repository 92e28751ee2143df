//! Upload progress notification

/// Receives a notification after every chunk written to a request body.
///
/// `total` is `None` unless the request was told the upload size.
pub trait UploadProgress: Send + Sync {
    fn on_upload(&self, uploaded: u64, total: Option<u64>);
}

/// Progress callback that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl UploadProgress for NoProgress {
    fn on_upload(&self, _uploaded: u64, _total: Option<u64>) {}
}

impl<F> UploadProgress for F
where
    F: Fn(u64, Option<u64>) + Send + Sync,
{
    fn on_upload(&self, uploaded: u64, total: Option<u64>) {
        self(uploaded, total);
    }
}
