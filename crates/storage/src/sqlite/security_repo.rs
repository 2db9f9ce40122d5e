use sqlx::Row;

use drive_core::model::{AnswerHash, SecurityProfile, SecurityQuestion, UserId};

use super::{
    SqliteStore,
    mapping::{conn, ser},
};
use crate::repository::{SecurityRepository, StorageError};

#[async_trait::async_trait]
impl SecurityRepository for SqliteStore {
    async fn security_profile(
        &self,
        user: &UserId,
    ) -> Result<Option<SecurityProfile>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question, answer_hash
            FROM security_questions
            WHERE user_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            let question: String = row.try_get("question").map_err(ser)?;
            let answer_hash: String = row.try_get("answer_hash").map_err(ser)?;
            questions.push(SecurityQuestion {
                question,
                answer_hash: AnswerHash::from_stored(answer_hash),
            });
        }

        Ok(Some(SecurityProfile::new(questions)))
    }

    async fn save_security_profile(
        &self,
        user: &UserId,
        profile: &SecurityProfile,
    ) -> Result<(), StorageError> {
        // Wholesale overwrite: drop the old set, then insert in order.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM security_questions WHERE user_id = ?1")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in profile.questions().iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO security_questions (user_id, position, question, answer_hash)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(user.as_str())
            .bind(position)
            .bind(&question.question)
            .bind(question.answer_hash.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
