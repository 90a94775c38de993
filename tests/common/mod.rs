//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use esindex::config::IndexConfig;
use esindex::crypto::{ContentCipher, Sealed};
use esindex::index::IndexStore;
use esindex::model::{DecryptedContent, MessageMetadata, Recipient, UserId};
use esindex::state::IndexStates;
use esindex::IndexError;

/// Keyed XOR with a per-message nonce. Good enough to keep plaintext out of
/// the files under test; not encryption.
#[derive(Debug)]
pub struct TestCipher {
    key: u8,
    counter: AtomicU64,
}

impl Default for TestCipher {
    fn default() -> Self {
        Self {
            key: 0xa7,
            counter: AtomicU64::new(1),
        }
    }
}

impl TestCipher {
    fn apply(&self, nonce: &[u8], data: &[u8]) -> Vec<u8> {
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key ^ nonce[i % nonce.len()])
            .collect()
    }
}

impl ContentCipher for TestCipher {
    fn seal(&self, plaintext: &[u8]) -> esindex::Result<Sealed> {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec();
        let ciphertext = self.apply(&nonce, plaintext);
        Ok(Sealed { nonce, ciphertext })
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> esindex::Result<Vec<u8>> {
        if nonce.len() != 8 {
            return Err(IndexError::Crypto("unexpected nonce length".into()));
        }
        Ok(self.apply(nonce, ciphertext))
    }
}

pub fn store_with(dir: &Path, config: IndexConfig) -> IndexStore {
    IndexStore::new(
        dir,
        config,
        Arc::new(IndexStates::new()),
        Arc::new(TestCipher::default()),
    )
}

/// A store whose user is already allowed to write.
pub fn enabled_store(dir: &Path, user: &UserId, config: IndexConfig) -> IndexStore {
    let store = store_with(dir, config);
    store.states().enable(user).unwrap();
    store
}

/// Content of a fixed size per `body_len`, so entries are interchangeable
/// for size accounting.
pub fn content(tag: &str, body_len: usize) -> DecryptedContent {
    let mut body = String::with_capacity(body_len);
    let words = ["alpha ", "bravo ", "charlie ", "delta ", "echo "];
    let mut i = 0;
    while body.len() < body_len {
        body.push_str(words[i % words.len()]);
        i += 1;
    }
    body.truncate(body_len);
    DecryptedContent {
        subject: format!("subject {tag}"),
        sender: Recipient::new("Sender", "sender@example.com"),
        to: vec![Recipient::new("", "me@example.com")],
        body,
        ..Default::default()
    }
}

pub fn meta(id: &str, time: i64) -> MessageMetadata {
    MessageMetadata::new(id, time, 0).with_labels(["0"])
}
