//! Response produced by a handler.

use bytes::Bytes;

/// Output of one request: STDOUT bytes, STDERR bytes and the
/// application status carried by END_REQUEST.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Bytes for the STDOUT stream.
    pub stdout: Bytes,
    /// Bytes for the STDERR stream.
    pub stderr: Bytes,
    /// Application exit status.
    pub app_status: u32,
}

impl Response {
    /// Response with the given STDOUT and status 0.
    pub fn new(stdout: impl Into<Bytes>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Response with no output at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the STDERR bytes.
    pub fn with_stderr(mut self, stderr: impl Into<Bytes>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Set the application status.
    pub fn with_status(mut self, app_status: u32) -> Self {
        self.app_status = app_status;
        self
    }
}
