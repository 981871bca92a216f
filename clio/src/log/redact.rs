//! Secret masking for log output.

use std::io;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing_subscriber::fmt::MakeWriter;

/// Replacement text for redacted values.
pub const REDACTED: &str = "*******";

/// Values that must never appear in log output.
///
/// Cloning is cheap; all clones share the same set of values, so values
/// added after the logger is built are still masked.
#[derive(Debug, Clone, Default)]
pub struct RedactStore {
    values: Arc<RwLock<Vec<String>>>,
}

impl RedactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register values to mask. Empty strings are ignored.
    pub fn add<I, S>(&self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut current = self.values.write();
        for value in values {
            let value = value.into();
            if !value.is_empty() && !current.contains(&value) {
                current.push(value);
            }
        }
        // longest first so a value containing another is masked whole
        current.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// Registered values, longest first.
    pub fn values(&self) -> Vec<String> {
        self.values.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Mask every registered value in `text`.
    pub fn redact(&self, text: &str) -> String {
        let values = self.values.read();
        let mut out = text.to_string();
        for value in values.iter() {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), REDACTED);
            }
        }
        out
    }
}

/// [`MakeWriter`] that masks redacted values in everything written through it.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    store: RedactStore,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, store: RedactStore) -> Self {
        Self { inner, store }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            store: self.store.clone(),
        }
    }
}

/// Writer returned by [`RedactingMakeWriter`].
///
/// Each formatted log record arrives in a single write, so values are never
/// split across calls.
#[derive(Debug)]
pub struct RedactingWriter<W> {
    inner: W,
    store: RedactStore,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.store.is_empty() {
            return self.inner.write(buf);
        }
        let text = String::from_utf8_lossy(buf);
        self.inner.write_all(self.store.redact(&text).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
