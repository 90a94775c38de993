//! Oldest-first eviction of index rows under storage pressure.

use rusqlite::OptionalExtension;
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::model::UserId;

use super::files;
use super::schema::{ORDER_ASC, TABLE};
use super::store::{delete_row, IndexStore};

/// Progress of a running [`IndexStore::shrink`], reported after each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkProgress {
    pub target: u64,
    pub size_before: u64,
    pub rows_deleted: usize,
    /// `size_before` minus the recorded sizes of the deleted rows.
    pub estimated_size: u64,
}

/// Summary of a finished shrink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShrinkReport {
    pub size_before: u64,
    pub size_after: u64,
    pub rows_deleted: usize,
    /// Sum of the recorded ciphertext sizes of the deleted rows.
    pub bytes_deleted: u64,
    /// The index ran out of rows.
    pub exhausted: bool,
    /// The progress callback asked to stop.
    pub cancelled: bool,
}

impl IndexStore {
    /// Delete the oldest rows until `user`'s index fits in `target` bytes.
    ///
    /// The loop stops as soon as either the estimate (`size_before` minus the
    /// deleted rows' sizes) drops below `target` or the measured footprint is
    /// at most `target`, when the table is empty, or when `progress` returns
    /// `false`. Each row is deleted on its own, so stopping early leaves a
    /// consistent index. The user's guard is held for the whole pass.
    pub fn shrink(
        &self,
        user: &UserId,
        target: u64,
        progress: Option<&dyn Fn(&ShrinkProgress) -> bool>,
    ) -> Result<ShrinkReport> {
        let dir = self.dir().to_path_buf();
        let report = self.with_connection(user, false, |index, conn| {
            let measure =
                || files::footprint(&dir, user).map_err(|e| IndexError::io(&index.db_path, e));

            let size_before = measure()?;
            let mut report = ShrinkReport {
                size_before,
                size_after: size_before,
                ..ShrinkReport::default()
            };
            if size_before <= target {
                return Ok(report);
            }

            let oldest_sql = format!("SELECT ID FROM {TABLE} ORDER BY {ORDER_ASC} LIMIT 1");
            loop {
                let oldest: Option<String> = conn
                    .query_row(&oldest_sql, [], |r| r.get(0))
                    .optional()
                    .map_err(|e| IndexError::database(&index.db_path, e))?;
                let Some(message_id) = oldest else {
                    report.exhausted = true;
                    break;
                };

                let deleted = delete_row(conn, &message_id)
                    .map_err(|e| IndexError::database(&index.db_path, e))?
                    .unwrap_or(0);
                report.rows_deleted += 1;
                report.bytes_deleted += deleted;

                let estimated_size = size_before.saturating_sub(report.bytes_deleted);
                let measured = measure()?;
                debug!(
                    user = %user,
                    message_id = %message_id,
                    bytes = deleted,
                    estimated = estimated_size,
                    measured,
                    "Evicted index entry"
                );

                let reached = estimated_size < target || measured <= target;
                if let Some(cb) = progress {
                    let keep_going = cb(&ShrinkProgress {
                        target,
                        size_before,
                        rows_deleted: report.rows_deleted,
                        estimated_size,
                    });
                    if !keep_going && !reached {
                        report.cancelled = true;
                        break;
                    }
                }
                if reached {
                    break;
                }
            }

            report.size_after = measure()?;
            Ok(report)
        })?;

        let report = report.unwrap_or_default();
        if report.rows_deleted > 0 {
            info!(
                user = %user,
                rows = report.rows_deleted,
                before = report.size_before,
                after = report.size_after,
                target,
                cancelled = report.cancelled,
                "Shrunk search index"
            );
        }
        Ok(report)
    }
}
