use super::{SqliteStore, mapping::conn};
use crate::repository::{AuditRecord, AuditRepository, StorageError};

#[async_trait::async_trait]
impl AuditRepository for SqliteStore {
    async fn append(&self, collection: &str, record: AuditRecord) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO audit_log (collection, recorded_at, payload)
            VALUES (?1, ?2, ?3)
            ",
        )
        .bind(collection)
        .bind(record.recorded_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
