//! Evaluate a parsed query against one decoded message.

use chrono::DateTime;

use crate::cache::CachedMessage;
use crate::model::Recipient;

use super::query::{DateFilter, SearchField, SearchOperator, SearchQuery, SearchTerm};

/// Whether `message` satisfies `query`.
///
/// Flag and date filters are checked first (cheapest), then text terms.
/// An empty query matches everything.
pub fn matches(message: &CachedMessage, query: &SearchQuery) -> bool {
    if let Some(df) = query.date_filter {
        if !matches_date(message.time, &df) {
            return false;
        }
    }

    let content = &message.content;
    if let Some(want_att) = query.has_attachment {
        if (content.num_attachments > 0) != want_att {
            return false;
        }
    }
    if let Some(want_unread) = query.unread {
        if content.unread != want_unread {
            return false;
        }
    }
    if let Some(want_starred) = query.starred {
        if content.starred != want_starred {
            return false;
        }
    }

    if query.terms.is_empty() {
        return true;
    }
    if query.is_or {
        query.terms.iter().any(|term| term_matches(message, term))
    } else {
        query.terms.iter().all(|term| term_matches(message, term))
    }
}

fn term_matches(message: &CachedMessage, term: &SearchTerm) -> bool {
    let content = &message.content;
    let op = &term.operator;
    let raw_match = match term.field {
        SearchField::All => {
            matches_text(&content.subject, op)
                || matches_recipient(&content.sender, op)
                || content.to.iter().any(|r| matches_recipient(r, op))
                || content.cc.iter().any(|r| matches_recipient(r, op))
                || contains_text(&content.body, op)
        }
        SearchField::From => matches_recipient(&content.sender, op),
        SearchField::To => content.to.iter().any(|r| matches_recipient(r, op)),
        SearchField::Cc => content.cc.iter().any(|r| matches_recipient(r, op)),
        SearchField::Subject => matches_text(&content.subject, op),
        SearchField::Body => contains_text(&content.body, op),
        SearchField::Label => message.label_ids.iter().any(|l| matches_text(l, op)),
        SearchField::MessageId => matches_text(&message.message_id, op),
    };

    if term.negated {
        !raw_match
    } else {
        raw_match
    }
}

fn matches_recipient(recipient: &Recipient, op: &SearchOperator) -> bool {
    matches_text(&recipient.email, op) || matches_text(&recipient.name, op)
}

/// Case-insensitive match of a short field.
fn matches_text(haystack: &str, op: &SearchOperator) -> bool {
    let haystack_lower = haystack.to_lowercase();
    match op {
        SearchOperator::Contains(needle) => haystack_lower.contains(needle),
        SearchOperator::Exact(phrase) => haystack_lower == *phrase,
    }
}

/// Body text: quoted phrases match anywhere, not the whole body.
fn contains_text(haystack: &str, op: &SearchOperator) -> bool {
    let needle = match op {
        SearchOperator::Contains(n) | SearchOperator::Exact(n) => n,
    };
    haystack.to_lowercase().contains(needle.as_str())
}

fn matches_date(time: i64, filter: &DateFilter) -> bool {
    DateTime::from_timestamp(time, 0).is_some_and(|dt| filter.contains(dt.date_naive()))
}
