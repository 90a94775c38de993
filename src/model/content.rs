//! Searchable message content, in clear and sealed form.

use super::recipient::Recipient;

/// The decrypted, search-ready fields of one message.
///
/// Values of this type only ever live in memory. Before they reach disk they
/// are serialized and sealed into an [`EncryptedContent`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DecryptedContent {
    pub subject: String,
    pub sender: Recipient,
    /// Plain-text body, already stripped of markup.
    pub body: String,
    pub to: Vec<Recipient>,
    pub cc: Vec<Recipient>,
    pub bcc: Vec<Recipient>,
    pub address_id: String,
    pub conversation_id: String,
    pub flags: i64,
    pub unread: bool,
    pub starred: bool,
    pub replied: bool,
    pub replied_all: bool,
    pub forwarded: bool,
    pub num_attachments: u32,
    /// Expiration as seconds since the epoch, `0` when the message never expires.
    pub expiration_time: i64,
}

impl DecryptedContent {
    /// Approximate heap bytes held by the text fields.
    pub fn heap_size(&self) -> usize {
        let recipients = |list: &[Recipient]| {
            list.iter()
                .map(|r| r.heap_size() + std::mem::size_of::<Recipient>())
                .sum::<usize>()
        };
        self.subject.len()
            + self.sender.heap_size()
            + self.body.len()
            + recipients(&self.to)
            + recipients(&self.cc)
            + recipients(&self.bcc)
            + self.address_id.len()
            + self.conversation_id.len()
    }
}

/// A sealed [`DecryptedContent`], as stored in the index.
///
/// Both fields are base64 text so they can live in a `TEXT` column or a
/// plain side file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    /// Base64 nonce / initialization vector.
    pub iv: String,
    /// Base64 ciphertext.
    pub ciphertext: String,
    /// Length of the raw (decoded) ciphertext in bytes.
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_size_counts_text() {
        let empty = DecryptedContent::default();
        let mut content = DecryptedContent {
            subject: "hello".into(),
            body: "x".repeat(100),
            ..Default::default()
        };
        assert_eq!(content.heap_size(), empty.heap_size() + 105);

        content.to.push(Recipient::new("a", "a@b.c"));
        assert!(content.heap_size() > empty.heap_size() + 105 + 6);
    }
}
