//! Transactional Bulk Replace
//!
//! Swaps the entire contents of a table in one transaction: delete every
//! row, insert the job's rows, commit. Any failure after BEGIN rolls back,
//! so readers see either the old contents or the new ones.

use crate::error::Result;
use crate::executor::ReloadConnection;
use crate::reload::ReloadJob;

/// Delete-then-insert replacement of a whole table
pub struct BulkReplace;

impl BulkReplace {
    /// Replace the job's table with the job's rows.
    ///
    /// Rows are validated before BEGIN, so an invalid dataset never issues a
    /// statement. Database errors are returned as-is for the caller to decide
    /// on a retry; a failed rollback is logged and never replaces the
    /// original error.
    pub async fn replace<C>(conn: &mut C, job: &ReloadJob) -> Result<u64>
    where
        C: ReloadConnection + ?Sized,
    {
        job.validate()?;

        let host = conn.member().host_address.clone();
        let table = job.table();

        tracing::debug!("Replacing {} on {} with {} rows", table, host, job.len());
        conn.begin().await?;

        match Self::delete_and_insert(conn, job).await {
            Ok(inserted) => Ok(inserted),
            Err(e) => {
                tracing::warn!("Replace of {} on {} failed at {}, rolling back: {}", table, host, e.step(), e);
                if let Err(rollback_err) = conn.rollback().await {
                    tracing::error!("Rollback of {} on {} failed: {}", table, host, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn delete_and_insert<C>(conn: &mut C, job: &ReloadJob) -> Result<u64>
    where
        C: ReloadConnection + ?Sized,
    {
        let deleted = conn.delete_all(job.table()).await?;
        let inserted = if job.is_empty() {
            0
        } else {
            conn.insert_rows(job.table(), job.rows()).await?
        };
        conn.commit().await?;

        tracing::debug!("{}: deleted {} rows, inserted {}", job.table(), deleted, inserted);
        Ok(inserted)
    }
}
