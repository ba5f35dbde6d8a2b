// Copyright 2026 linger Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::{Debug, Display},
    sync::Arc,
};

/// ErrorKind is all kinds of [`Error`] of the credential release path.
///
/// The kind decides how retirement treats a failure: recoverable kinds are
/// logged and suppressed, fatal kinds propagate to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The native security library reported a failure while releasing a
    /// credential. Recoverable.
    Native,
    /// The process's memory or state integrity can no longer be trusted.
    /// Fatal, never suppressed.
    Corruption,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        match self {
            ErrorKind::Native => "Native release failure",
            ErrorKind::Corruption => "Process state corruption",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

/// Error returned by credential release and retirement operations.
pub struct Error {
    kind: ErrorKind,
    message: String,
    source: Option<Arc<anyhow::Error>>,
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut de = f.debug_struct("Error");
        de.field("kind", &self.kind);
        de.field("message", &self.message);
        de.field("source", &self.source);
        de.finish()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref().as_ref())
    }
}

impl Error {
    /// Create a new error.
    ///
    /// If the error needs to carry a source error, please use the
    /// `with_source` method.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Set source for error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the error indicates that the process can no longer be trusted
    /// to continue.
    ///
    /// Fatal errors always propagate out of [`retire`]; everything else is
    /// contained there.
    ///
    /// [`retire`]: crate::HandleCache::retire
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Corruption)
    }

    /// Downcast the reference of the source error to a specific error type
    /// reference.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

/// Result type for credential release and retirement operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Error>();
    }

    #[test]
    fn test_error_display() {
        let source = std::io::Error::other("status 0x80090302");
        let err = Error::new(ErrorKind::Native, "failed to free credentials handle").with_source(source);

        assert_eq!(
            "Native release failure => failed to free credentials handle, source: status 0x80090302",
            err.to_string()
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!Error::new(ErrorKind::Native, "").is_fatal());
        assert!(Error::new(ErrorKind::Corruption, "").is_fatal());
    }

    #[test]
    fn test_error_downcast() {
        let err = Error::new(ErrorKind::Native, "").with_source(std::io::Error::other("nested"));
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }
}
