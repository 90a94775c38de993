//! Turn a decrypted RFC 5322 message into searchable content.

use std::borrow::Cow;

use mail_parser::{Address, Addr, MessageParser};

use crate::model::{DecryptedContent, Recipient};

/// Searchable fields of a raw message.
///
/// Never fails: when the message cannot be parsed, the text after the first
/// blank line becomes the body and every other field stays empty.
pub fn content_from_mime(raw: &[u8]) -> DecryptedContent {
    let data = strip_preamble(raw);
    let Some(msg) = MessageParser::default().parse(data) else {
        return DecryptedContent {
            body: body_fallback(data),
            ..Default::default()
        };
    };

    let body = msg
        .body_text(0)
        .map(Cow::into_owned)
        .or_else(|| msg.body_html(0).map(|html| html_to_text(&html)))
        .unwrap_or_default();

    DecryptedContent {
        subject: msg.subject().unwrap_or_default().to_string(),
        sender: msg
            .from()
            .and_then(|a| recipients(a).into_iter().next())
            .unwrap_or_default(),
        body,
        to: msg.to().map(recipients).unwrap_or_default(),
        cc: msg.cc().map(recipients).unwrap_or_default(),
        bcc: msg.bcc().map(recipients).unwrap_or_default(),
        num_attachments: msg.attachment_count() as u32,
        ..Default::default()
    }
}

fn recipients(address: &Address<'_>) -> Vec<Recipient> {
    let to_recipient = |addr: &Addr<'_>| {
        Recipient::new(
            addr.name.as_deref().unwrap_or_default(),
            addr.address.as_deref().unwrap_or_default(),
        )
    };
    match address {
        Address::List(list) => list.iter().map(to_recipient).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .map(to_recipient)
            .collect(),
    }
}

/// Drop a UTF-8 BOM and an mbox `From ` separator line.
fn strip_preamble(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

fn body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else {
        String::new()
    }
}

/// Reduce HTML to plain text for indexing.
///
/// Scripts and styles are dropped, block elements become line breaks, the
/// common entities are decoded, and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_element(html, "script");
    text = remove_element(&text, "style");

    let mut stripped = String::with_capacity(text.len());
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if is_block_tag(&tag) {
                    stripped.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => stripped.push(ch),
        }
    }

    for (entity, replacement) in [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        ("&amp;", "&"),
    ] {
        stripped = stripped.replace(entity, replacement);
    }

    let mut cleaned = String::with_capacity(stripped.len());
    let mut prev_blank = false;
    for line in stripped.lines().map(str::trim) {
        if line.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn is_block_tag(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(
        name.as_str(),
        "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

/// Remove `<tag ...>...</tag>` blocks, case-insensitively.
fn remove_element(html: &str, tag: &str) -> String {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open).map(|i| i + pos) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAIN: &[u8] = b"From: Alice Example <alice@example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Cc: Dan <dan@example.com>\r\n\
Subject: Lunch plans\r\n\
Date: Thu, 04 Mar 2021 12:00:00 +0000\r\n\
Message-ID: <m1@example.com>\r\n\
\r\n\
Shall we meet at noon?\r\n";

    #[test]
    fn test_plain_message() {
        let content = content_from_mime(PLAIN);
        assert_eq!(content.subject, "Lunch plans");
        assert_eq!(content.sender, Recipient::new("Alice Example", "alice@example.com"));
        assert_eq!(content.to.len(), 2);
        assert_eq!(content.to[1].email, "carol@example.com");
        assert_eq!(content.cc[0].name, "Dan");
        assert!(content.body.contains("meet at noon"));
        assert_eq!(content.num_attachments, 0);
    }

    #[test]
    fn test_mbox_separator_is_skipped() {
        let mut raw = b"From alice@example.com Thu Mar  4 12:00:00 2021\n".to_vec();
        raw.extend_from_slice(PLAIN);
        assert_eq!(content_from_mime(&raw).subject, "Lunch plans");
    }

    #[test]
    fn test_html_only_body() {
        let raw = b"From: a@example.com\r\n\
Subject: Newsletter\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><style>p { color: red }</style><p>Hello &amp; welcome</p><p>Second</p></html>\r\n";
        let content = content_from_mime(raw);
        assert!(content.body.contains("Hello & welcome"));
        assert!(content.body.contains("Second"));
        assert!(!content.body.contains("color"));
    }

    #[test]
    fn test_html_to_text() {
        let text = html_to_text("<div>One<br/>Two</div><SCRIPT>alert(1)</SCRIPT><p>&lt;3</p>");
        assert_eq!(text, "One\nTwo\n\n<3");
    }

    #[test]
    fn test_remove_element_keeps_unicode() {
        let html = "<p>Grüße</p><script>x</script>ñ";
        assert_eq!(remove_element(html, "script"), "<p>Grüße</p>ñ");
    }
}
