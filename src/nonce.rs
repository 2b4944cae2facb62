//! Replay nonce storage.
//!
//! See [RFC 8555 §6.5](https://datatracker.ietf.org/doc/html/rfc8555#section-6.5).

use tokio::sync::{Mutex, MutexGuard};

/// Holds the last replay nonce handed out by the CA for a session.
///
/// Signed requests acquire the store through [`NonceStore::lock()`] and keep it until the response
/// nonce is stored, so no two requests of a session ever race for the same nonce.
#[derive(Debug, Default)]
pub struct NonceStore {
    slot: Mutex<Option<String>>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the nonce slot.
    ///
    /// Access is granted in request order. The slot is released when the holder is dropped,
    /// including on error and cancellation.
    pub async fn lock(&self) -> NonceHolder<'_> {
        NonceHolder {
            slot: self.slot.lock().await,
        }
    }

    /// Returns a copy of the current nonce.
    pub async fn get(&self) -> Option<String> {
        self.slot.lock().await.clone()
    }

    /// Replaces the current nonce.
    pub async fn set(&self, nonce: Option<String>) {
        *self.slot.lock().await = nonce;
    }
}

/// Exclusive access to a session's nonce slot.
#[derive(Debug)]
pub struct NonceHolder<'a> {
    slot: MutexGuard<'a, Option<String>>,
}

impl NonceHolder<'_> {
    pub fn nonce(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    /// Removes the nonce from the slot for use in a request.
    pub fn take(&mut self) -> Option<String> {
        let nonce = self.slot.take();

        if nonce.is_some() {
            log::trace!("Use previous nonce");
        }

        nonce
    }

    pub fn set_nonce(&mut self, nonce: Option<String>) {
        if nonce.is_some() {
            log::trace!("Extracting new nonce");
        }

        *self.slot = nonce;
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn take_consumes() {
        let store = NonceStore::new();
        store.set(Some("abc".to_owned())).await;

        {
            let mut holder = store.lock().await;
            assert_eq!(holder.nonce(), Some("abc"));
            assert_eq!(holder.take().as_deref(), Some("abc"));
            assert!(holder.take().is_none());
            holder.set_nonce(Some("def".to_owned()));
        }

        assert_eq!(store.get().await.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn holders_are_exclusive() {
        let store = Arc::new(NonceStore::new());
        let holder = store.lock().await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut holder = store.lock().await;
                holder.set_nonce(Some("second".to_owned()));
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(holder);
        waiter.await.unwrap();
        assert_eq!(store.get().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn cancelled_holder_releases() {
        let store = Arc::new(NonceStore::new());

        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let _holder = store.lock().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        task.abort();
        let _ = task.await;

        let holder = tokio::time::timeout(Duration::from_secs(1), store.lock())
            .await
            .expect("slot released after cancellation");
        assert!(holder.nonce().is_none());
    }
}
