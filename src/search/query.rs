//! Search query parser.
//!
//! Parses user-typed query strings into a structured [`SearchQuery`].
//!
//! # Supported syntax
//!
//! **Simple search**: `text` matches subject, sender, recipients, and body.
//!
//! **Field-specific**: `from:`, `to:`, `cc:`, `subject:`, `body:`,
//! `label:`, `id:`
//!
//! **Flags**:
//! - `has:attachment` / `has:no-attachment`
//! - `is:unread` / `is:read` / `is:starred`
//!
//! **Date filters**:
//! - `date:2024-01-01` / `date:2024-01` / `date:2024`
//! - `date:2024-01-01..2024-06-30` (either side may be a month or a year)
//! - `before:2024-06-01` / `after:2024-01-01`
//!
//! **Operators**:
//! - `term1 term2`: implicit AND
//! - `term1 OR term2`: any term may match
//! - `-term`: exclude
//! - `"exact phrase"`: quoted phrase

use chrono::NaiveDate;

/// Which field to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    /// Subject, sender, recipients, and body.
    All,
    From,
    To,
    Cc,
    Subject,
    Body,
    Label,
    MessageId,
}

const FIELD_PREFIXES: [(&str, SearchField); 7] = [
    ("from:", SearchField::From),
    ("to:", SearchField::To),
    ("cc:", SearchField::Cc),
    ("subject:", SearchField::Subject),
    ("body:", SearchField::Body),
    ("label:", SearchField::Label),
    ("id:", SearchField::MessageId),
];

/// How to match text. Needles are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOperator {
    /// Case-insensitive substring match.
    Contains(String),
    /// Quoted phrase. Short fields must equal it; the body must contain it.
    Exact(String),
}

/// Date filter, in UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// Inclusive on both ends.
    Between(NaiveDate, NaiveDate),
    /// Strictly before.
    Before(NaiveDate),
    /// Strictly after.
    After(NaiveDate),
}

impl DateFilter {
    pub fn contains(&self, date: NaiveDate) -> bool {
        match *self {
            DateFilter::Between(start, end) => start <= date && date <= end,
            DateFilter::Before(d) => date < d,
            DateFilter::After(d) => date > d,
        }
    }
}

/// A single search term.
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub field: SearchField,
    pub operator: SearchOperator,
    pub negated: bool,
}

/// A fully parsed search query.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub terms: Vec<SearchTerm>,
    pub date_filter: Option<DateFilter>,
    /// `Some(true)` for has:attachment, `Some(false)` for has:no-attachment.
    pub has_attachment: Option<bool>,
    /// `Some(true)` for is:unread, `Some(false)` for is:read.
    pub unread: Option<bool>,
    pub starred: Option<bool>,
    /// Any term may match instead of all of them.
    pub is_or: bool,
}

impl SearchQuery {
    /// Whether the query places no constraint at all.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.date_filter.is_none()
            && self.has_attachment.is_none()
            && self.unread.is_none()
            && self.starred.is_none()
    }

    fn push_token(&mut self, token: &str) {
        let (negated, token) = match token.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest),
            _ => (false, token),
        };

        for (prefix, field) in FIELD_PREFIXES {
            if let Some(value) = token.strip_prefix(prefix) {
                self.terms.push(SearchTerm {
                    field,
                    operator: make_operator(value),
                    negated,
                });
                return;
            }
        }

        if let Some(value) = token.strip_prefix("has:") {
            match value {
                "attachment" | "attachments" => self.has_attachment = Some(!negated),
                "no-attachment" | "no-attachments" => self.has_attachment = Some(negated),
                _ => {}
            }
        } else if let Some(value) = token.strip_prefix("is:") {
            match value {
                "unread" => self.unread = Some(!negated),
                "read" => self.unread = Some(negated),
                "starred" => self.starred = Some(!negated),
                _ => {}
            }
        } else if let Some(value) = token.strip_prefix("date:") {
            self.date_filter = parse_date_filter(value).or(self.date_filter);
        } else if let Some(value) = token.strip_prefix("before:") {
            if let Some((start, _)) = period(value) {
                self.date_filter = Some(DateFilter::Before(start));
            }
        } else if let Some(value) = token.strip_prefix("after:") {
            if let Some((_, end)) = period(value) {
                self.date_filter = Some(DateFilter::After(end));
            }
        } else {
            self.terms.push(SearchTerm {
                field: SearchField::All,
                operator: make_operator(token),
                negated,
            });
        }
    }
}

/// Parse a query string into a structured [`SearchQuery`].
///
/// Never fails. Unrecognized syntax is treated as plain text.
pub fn parse_query(input: &str) -> SearchQuery {
    let tokens = tokenize(input.trim());
    let mut query = SearchQuery {
        is_or: tokens.iter().any(|t| t == "OR"),
        ..SearchQuery::default()
    };
    for token in tokens.iter().filter(|t| *t != "OR") {
        query.push_token(token);
    }
    query
}

fn make_operator(value: &str) -> SearchOperator {
    match value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    {
        Some(phrase) => SearchOperator::Exact(phrase.to_lowercase()),
        None => SearchOperator::Contains(value.trim_matches('"').to_lowercase()),
    }
}

/// Split on whitespace outside double quotes. Quotes are kept.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `date:` value: one period, or `start..end` where each side is a period.
fn parse_date_filter(value: &str) -> Option<DateFilter> {
    let (start, end) = match value.split_once("..") {
        Some((from, to)) => (period(from)?.0, period(to)?.1),
        None => period(value)?,
    };
    Some(DateFilter::Between(start, end))
}

/// First and last day of `YYYY-MM-DD`, `YYYY-MM`, or `YYYY`.
fn period(s: &str) -> Option<(NaiveDate, NaiveDate)> {
    let parts: Vec<&str> = s.split('-').collect();
    match parts.as_slice() {
        [_, _, _] => {
            let day = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some((day, day))
        }
        [year, month] => {
            let year: i32 = year.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            let next = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)?
            };
            Some((first, next.pred_opt()?))
        }
        [year] if year.len() == 4 => {
            let year: i32 = year.parse().ok()?;
            Some((
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year, 12, 31)?,
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_simple_query() {
        let q = parse_query("hello");
        assert_eq!(q.terms.len(), 1);
        assert_eq!(q.terms[0].field, SearchField::All);
        assert!(!q.terms[0].negated);
    }

    #[test]
    fn test_parse_field_query() {
        let q = parse_query("from:user@example.com subject:hello label:5 id:m1");
        let fields: Vec<_> = q.terms.iter().map(|t| t.field).collect();
        assert_eq!(
            fields,
            [
                SearchField::From,
                SearchField::Subject,
                SearchField::Label,
                SearchField::MessageId
            ]
        );
    }

    #[test]
    fn test_parse_negation() {
        let q = parse_query("-subject:spam");
        assert_eq!(q.terms.len(), 1);
        assert!(q.terms[0].negated);
        assert_eq!(q.terms[0].field, SearchField::Subject);

        // A lone dash is text, not an empty negation.
        let q = parse_query("-");
        assert!(!q.terms[0].negated);
    }

    #[test]
    fn test_parse_attachment_flags() {
        assert_eq!(parse_query("has:attachment").has_attachment, Some(true));
        assert_eq!(parse_query("has:no-attachment").has_attachment, Some(false));
        assert_eq!(parse_query("-has:attachment").has_attachment, Some(false));
        assert!(parse_query("has:attachment").terms.is_empty());
    }

    #[test]
    fn test_parse_dates() {
        assert_eq!(
            parse_query("date:2024-01-15").date_filter,
            Some(DateFilter::Between(day("2024-01-15"), day("2024-01-15")))
        );
        assert_eq!(
            parse_query("date:2024-02").date_filter,
            Some(DateFilter::Between(day("2024-02-01"), day("2024-02-29")))
        );
        assert_eq!(
            parse_query("date:2023").date_filter,
            Some(DateFilter::Between(day("2023-01-01"), day("2023-12-31")))
        );
        assert_eq!(
            parse_query("date:2024-01..2024-06").date_filter,
            Some(DateFilter::Between(day("2024-01-01"), day("2024-06-30")))
        );
        assert_eq!(
            parse_query("date:2024-12").date_filter,
            Some(DateFilter::Between(day("2024-12-01"), day("2024-12-31")))
        );
        assert_eq!(parse_query("date:someday").date_filter, None);
    }

    #[test]
    fn test_parse_before_after() {
        assert_eq!(
            parse_query("before:2024-06-01").date_filter,
            Some(DateFilter::Before(day("2024-06-01")))
        );
        assert_eq!(
            parse_query("after:2024-01").date_filter,
            Some(DateFilter::After(day("2024-01-31")))
        );
    }

    #[test]
    fn test_date_filter_contains() {
        let f = DateFilter::Between(day("2024-01-01"), day("2024-01-31"));
        assert!(f.contains(day("2024-01-01")));
        assert!(f.contains(day("2024-01-31")));
        assert!(!f.contains(day("2024-02-01")));
        assert!(!DateFilter::Before(day("2024-01-01")).contains(day("2024-01-01")));
    }

    #[test]
    fn test_parse_flags() {
        let q = parse_query("is:unread -is:starred");
        assert_eq!(q.unread, Some(true));
        assert_eq!(q.starred, Some(false));
        assert!(q.terms.is_empty());
        assert!(!q.is_empty());

        assert_eq!(parse_query("is:read").unread, Some(false));
    }

    #[test]
    fn test_parse_or_query() {
        let q = parse_query("from:alice OR from:bob");
        assert!(q.is_or);
        assert_eq!(q.terms.len(), 2);
    }

    #[test]
    fn test_parse_quoted_phrase() {
        let q = parse_query("subject:\"Hello World\"");
        assert_eq!(q.terms.len(), 1);
        assert_eq!(q.terms[0].operator, SearchOperator::Exact("hello world".into()));

        // Unbalanced quotes fall back to a substring match.
        let q = parse_query("\"dangling");
        assert_eq!(q.terms[0].operator, SearchOperator::Contains("dangling".into()));
    }

    #[test]
    fn test_parse_empty_query() {
        let q = parse_query("   ");
        assert!(q.is_empty());
        assert!(!q.is_or);
    }
}
