//! Continue-on-failure error accumulation for batch processing

use std::fmt;

use crate::error::SyncError;

/// One failed item of a batch, tagged with the operation that produced it.
#[derive(Debug)]
pub struct ErrorEntry {
    pub operation: String,
    pub error: SyncError,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.error)
    }
}

/// Composite error holding every failure of a batch in insertion order.
///
/// Never empty: an [`ErrorList`] with nothing appended resolves to `Ok(())`.
#[derive(Debug)]
pub struct BatchError {
    entries: Vec<ErrorEntry>,
}

impl BatchError {
    /// Composite of exactly one failure.
    pub fn single(operation: impl Into<String>, error: SyncError) -> Self {
        Self {
            entries: vec![ErrorEntry {
                operation: operation.into(),
                error,
            }],
        }
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rendered messages, one per entry, suitable for a JSON response body.
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.to_string()).collect()
    }

    pub fn into_entries(self) -> Vec<ErrorEntry> {
        self.entries
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.entries.len() == 1 {
            "error"
        } else {
            "errors"
        };
        write!(f, "{} {} occurred:", self.entries.len(), noun)?;
        for entry in &self.entries {
            write!(f, "\n\t* {}", entry)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

/// Mutable collector passed by `&mut` through a batch loop and resolved once.
#[derive(Debug, Default)]
pub struct ErrorList {
    entries: Vec<ErrorEntry>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, operation: impl Into<String>, error: SyncError) {
        self.entries.push(ErrorEntry {
            operation: operation.into(),
            error,
        });
    }

    /// Merge a resolved batch from a nested level, keeping its entries flat.
    pub fn extend(&mut self, batch: BatchError) {
        self.entries.extend(batch.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve(self) -> Result<(), BatchError> {
        if self.entries.is_empty() {
            Ok(())
        } else {
            Err(BatchError {
                entries: self.entries,
            })
        }
    }
}
