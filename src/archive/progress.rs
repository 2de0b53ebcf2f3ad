//! Byte-counting reader with throttled progress callbacks.

use std::io::{self, Read};

use tokio_util::sync::CancellationToken;

/// Minimum advance between two progress callbacks.
pub const PROGRESS_INTERVAL: u64 = 64 * 1024;

/// Snapshot of a download/extraction in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionProgress {
    pub package: String,

    /// Bytes consumed from the source so far
    pub bytes_read: u64,

    /// Size announced by the manifest or the server, if known and non-zero
    pub declared_size: Option<u64>,

    /// `bytes_read / declared_size` in whole percent, clamped to 100;
    /// `None` when the size is unknown
    pub percent: Option<u8>,
}

impl ExtractionProgress {
    pub fn new(package: impl Into<String>, bytes_read: u64, declared_size: Option<u64>) -> Self {
        let declared_size = declared_size.filter(|size| *size > 0);
        Self {
            package: package.into(),
            bytes_read,
            declared_size,
            percent: percent_of(bytes_read, declared_size),
        }
    }
}

fn percent_of(bytes_read: u64, declared_size: Option<u64>) -> Option<u8> {
    match declared_size {
        Some(total) if total > 0 => {
            let percent = (bytes_read as u128 * 100) / total as u128;
            Some(percent.min(100) as u8)
        }
        _ => None,
    }
}

/// [`Read`] adapter that counts bytes and reports progress.
///
/// The callback fires when at least [`PROGRESS_INTERVAL`] bytes have been
/// read since the last report, when the count reaches the declared size, and
/// once at end of stream if anything is still unreported. Once the attached
/// cancellation token fires, every read fails.
pub struct CountingReader<R, F> {
    inner: R,
    package: String,
    declared_size: Option<u64>,
    bytes_read: u64,
    last_reported: u64,
    on_progress: F,
    cancel: Option<CancellationToken>,
}

impl<R, F> CountingReader<R, F>
where
    R: Read,
    F: FnMut(ExtractionProgress),
{
    pub fn new(
        inner: R,
        package: impl Into<String>,
        declared_size: Option<u64>,
        on_progress: F,
    ) -> Self {
        Self {
            inner,
            package: package.into(),
            declared_size: declared_size.filter(|size| *size > 0),
            bytes_read: 0,
            last_reported: 0,
            on_progress,
            cancel: None,
        }
    }

    /// Fail reads once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn report(&mut self) {
        self.last_reported = self.bytes_read;
        (self.on_progress)(ExtractionProgress {
            package: self.package.clone(),
            bytes_read: self.bytes_read,
            declared_size: self.declared_size,
            percent: percent_of(self.bytes_read, self.declared_size),
        });
    }
}

impl<R, F> Read for CountingReader<R, F>
where
    R: Read,
    F: FnMut(ExtractionProgress),
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(io::Error::other("read cancelled"));
        }

        let n = self.inner.read(buf)?;

        if n == 0 {
            if !buf.is_empty() && self.bytes_read > self.last_reported {
                self.report();
            }
            return Ok(0);
        }

        self.bytes_read += n as u64;
        let reached_total = self.declared_size == Some(self.bytes_read);
        if reached_total || self.bytes_read - self.last_reported >= PROGRESS_INTERVAL {
            self.report();
        }

        Ok(n)
    }
}
