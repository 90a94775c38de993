//! Row selection for index scans.
//!
//! Scans are keyset-paginated on `(Time, MessageOrder, ID)`, which is unique
//! per row, so a batch boundary never skips or repeats an entry even while
//! other rows are inserted or evicted between batches.

use rusqlite::types::Value;

use crate::model::SearchableEntry;

use super::schema::{CONTENT_COMPLETE, ORDER_ASC, ORDER_DESC, SELECT_COLUMNS, TABLE};

/// Direction of a chronological scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    Ascending,
    #[default]
    Descending,
}

/// Position of a row in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub time: i64,
    pub order: i64,
    pub message_id: String,
}

impl Cursor {
    pub fn new(time: i64, order: i64, message_id: impl Into<String>) -> Self {
        Self {
            time,
            order,
            message_id: message_id.into(),
        }
    }
}

impl From<&SearchableEntry> for Cursor {
    fn from(entry: &SearchableEntry) -> Self {
        Cursor::new(entry.time, entry.order, entry.message_id.clone())
    }
}

/// A simple range/equality predicate over index rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    pub order: TimeOrder,
    /// Only rows with `time >= min_time`.
    pub min_time: Option<i64>,
    /// Only rows strictly past this position in scan order.
    pub after: Option<Cursor>,
    /// Only rows carrying searchable content.
    pub content_complete: bool,
    pub limit: Option<usize>,
}

impl IndexQuery {
    pub fn newest_first() -> Self {
        Self {
            order: TimeOrder::Descending,
            ..Self::default()
        }
    }

    pub fn oldest_first() -> Self {
        Self {
            order: TimeOrder::Ascending,
            ..Self::default()
        }
    }

    pub fn since(mut self, min_time: i64) -> Self {
        self.min_time = Some(min_time);
        self
    }

    pub fn after(mut self, cursor: Cursor) -> Self {
        self.after = Some(cursor);
        self
    }

    pub fn content_complete(mut self) -> Self {
        self.content_complete = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the statement and its positional parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(min_time) = self.min_time {
            params.push(Value::Integer(min_time));
            conditions.push(format!("Time >= ?{}", params.len()));
        }
        if let Some(ref cursor) = self.after {
            let op = match self.order {
                TimeOrder::Ascending => ">",
                TimeOrder::Descending => "<",
            };
            params.push(Value::Integer(cursor.time));
            params.push(Value::Integer(cursor.order));
            params.push(Value::Text(cursor.message_id.clone()));
            let n = params.len();
            conditions.push(format!(
                "(Time, MessageOrder, ID) {op} (?{}, ?{}, ?{n})",
                n - 2,
                n - 1
            ));
        }
        if self.content_complete {
            conditions.push(format!("({CONTENT_COMPLETE})"));
        }

        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM {TABLE}");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(match self.order {
            TimeOrder::Ascending => ORDER_ASC,
            TimeOrder::Descending => ORDER_DESC,
        });
        if let Some(limit) = self.limit {
            params.push(Value::Integer(limit.min(i64::MAX as usize) as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }
        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query() {
        let (sql, params) = IndexQuery::oldest_first().to_sql();
        assert!(sql.ends_with("ORDER BY Time ASC, MessageOrder ASC, ID ASC"));
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_cursor_and_limit_parameters_are_numbered() {
        let (sql, params) = IndexQuery::newest_first()
            .since(100)
            .after(Cursor::new(500, 2, "m9"))
            .content_complete()
            .limit(10)
            .to_sql();
        assert!(sql.contains("Time >= ?1"));
        assert!(sql.contains("(Time, MessageOrder, ID) < (?2, ?3, ?4)"));
        assert!(sql.contains("LIMIT ?5"));
        assert_eq!(params.len(), 5);
        assert_eq!(params[3], Value::Text("m9".into()));
    }
}
