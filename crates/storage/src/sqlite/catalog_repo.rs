use sqlx::Row;

use drive_core::model::{Catalog, Course, CourseId, ModuleId};

use super::{
    SqliteStore,
    mapping::{conn, map_lesson_row, map_module_row, ser},
};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteStore {
    async fn load_catalog(&self, course: &CourseId) -> Result<Catalog, StorageError> {
        let row = sqlx::query("SELECT id, title, module_order FROM courses WHERE id = ?1")
            .bind(course.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let module_order_json: String = row.try_get("module_order").map_err(ser)?;
        let module_order: Vec<ModuleId> =
            serde_json::from_str(&module_order_json).map_err(ser)?;
        let course_record = Course {
            id: CourseId::new(row.try_get::<String, _>("id").map_err(ser)?),
            title: row.try_get("title").map_err(ser)?,
            module_order,
        };

        let rows = sqlx::query(
            "SELECT id, course_id, title, lesson_order FROM modules WHERE course_id = ?1",
        )
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut modules = Vec::with_capacity(rows.len());
        for row in rows {
            modules.push(map_module_row(&row)?);
        }

        let rows = sqlx::query(
            r"
            SELECT id, course_id, module_id, title, kind, video_url
            FROM lessons
            WHERE course_id = ?1
            ",
        )
        .bind(course.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            lessons.push(map_lesson_row(&row)?);
        }

        Ok(Catalog::new(course_record, modules, lessons))
    }

    async fn save_catalog(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let course = catalog.course();
        let module_order = serde_json::to_string(&course.module_order)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO courses (id, title, module_order)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                module_order = excluded.module_order
            ",
        )
        .bind(course.id.as_str())
        .bind(&course.title)
        .bind(module_order)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM modules WHERE course_id = ?1")
            .bind(course.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM lessons WHERE course_id = ?1")
            .bind(course.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for module_id in &course.module_order {
            // Only persist modules the catalog actually resolved.
            let Some(module) = catalog.module(module_id) else {
                continue;
            };
            let lesson_order = serde_json::to_string(&module.lesson_order)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            sqlx::query(
                r"
                INSERT INTO modules (id, course_id, title, lesson_order)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(module.id.as_str())
            .bind(module.course_id.as_str())
            .bind(&module.title)
            .bind(lesson_order)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for lesson_id in &module.lesson_order {
                let Some(lesson) = catalog.lesson(lesson_id) else {
                    continue;
                };
                sqlx::query(
                    r"
                    INSERT INTO lessons (id, course_id, module_id, title, kind, video_url)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(lesson.id.as_str())
                .bind(lesson.course_id.as_str())
                .bind(lesson.module_id.as_str())
                .bind(&lesson.title)
                .bind(lesson.kind.as_str())
                .bind(&lesson.video_url)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
