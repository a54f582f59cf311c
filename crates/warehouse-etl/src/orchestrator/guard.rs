//! Per-name mutual exclusion for coordinator operations, and the scoped
//! source reader each operation holds.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::traits::SourceReader;
use crate::error::{EtlError, Result};

/// Names with an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Held for the duration of one operation; releases the name on drop.
#[derive(Debug)]
pub struct OperationLease {
    name: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, failing with `Busy` when it is already claimed.
    pub fn acquire(&self, name: &str) -> Result<OperationLease> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| EtlError::Busy(name.to_string()))?;
        if !active.insert(name.to_string()) {
            return Err(EtlError::Busy(name.to_string()));
        }
        Ok(OperationLease {
            name: name.to_string(),
            active: Arc::clone(&self.active),
        })
    }
}

impl Drop for OperationLease {
    fn drop(&mut self) {
        // A poisoned set is still usable for removal
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        active.remove(&self.name);
    }
}

/// An open source reader that is closed when the lease ends.
///
/// `close` awaits the release. A lease dropped without it, such as when the
/// operation future is cancelled, hands the close to the runtime.
pub struct SourceLease {
    reader: Option<Box<dyn SourceReader>>,
}

impl SourceLease {
    pub fn new(reader: Box<dyn SourceReader>) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn reader(&self) -> &dyn SourceReader {
        match &self.reader {
            Some(reader) => reader.as_ref(),
            None => unreachable!("reader is only taken by close or drop"),
        }
    }

    pub async fn close(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.close().await;
        }
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("source reader dropped unclosed, closing in background");
                handle.spawn(async move { reader.close().await });
            }
            Err(_) => debug!("source reader dropped outside a runtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let guard = OperationGuard::new();
        let lease = guard.acquire("shop1").unwrap();
        assert!(matches!(guard.acquire("shop1"), Err(EtlError::Busy(n)) if n == "shop1"));
        assert!(guard.acquire("shop2").is_ok());
        drop(lease);
        assert!(guard.acquire("shop1").is_ok());
    }
}
