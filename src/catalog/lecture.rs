use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use time::OffsetDateTime;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{Catalog, format_ids, module::ModuleType, required};
use crate::{
    error::{Error, Result},
    identity::Identity,
    utils::now,
};

/// Swap the item at `index` with the one before it.
/// Returns false and leaves the slice alone when there is nothing to swap with.
pub fn move_up<T>(items: &mut [T], index: usize) -> bool {
    if index == 0 || index >= items.len() {
        return false;
    }
    items.swap(index - 1, index);
    true
}

/// Swap the item at `index` with the one after it.
pub fn move_down<T>(items: &mut [T], index: usize) -> bool {
    if index >= items.len().saturating_sub(1) {
        return false;
    }
    items.swap(index, index + 1);
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// A module as placed in a lecture, `order` is its 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, sqlx::FromRow)]
pub struct LectureModule {
    pub id: i64,
    #[sqlx(rename = "position")]
    pub order: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Lecture {
    pub id: i64,
    pub title: String,
    pub course_name: String,
    pub description: String,
    pub author_id: i64,
    pub published: bool,
    /// whether learners may go back to modules they already completed
    pub allow_back: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// delivery order
    pub module_ids: Vec<i64>,
    pub modules: Vec<LectureModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, sqlx::FromRow)]
pub struct LectureSummary {
    pub id: i64,
    pub title: String,
    pub course_name: String,
    pub description: String,
    pub author_id: i64,
    pub published: bool,
    pub allow_back: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub modules_count: i64,
}

#[derive(sqlx::FromRow)]
struct LectureRow {
    id: i64,
    title: String,
    course_name: String,
    description: String,
    author_id: i64,
    published: bool,
    allow_back: bool,
    created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewLecture {
    pub title: String,
    pub course_name: String,
    #[serde(default)]
    pub description: String,
    pub module_ids: Vec<i64>,
    #[serde(default)]
    pub allow_back: bool,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LectureUpdate {
    pub title: Option<String>,
    pub course_name: Option<String>,
    pub description: Option<String>,
    pub module_ids: Option<Vec<i64>>,
    pub allow_back: Option<bool>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LectureFilter {
    pub course_name: Option<String>,
    pub published: Option<bool>,
}

/// Ordered module ids of a lecture.
pub(crate) async fn lecture_module_ids(conn: &mut SqliteConnection, lecture_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "select module_id from lecture_modules where lecture_id = ? order by position",
    )
    .bind(lecture_id)
    .fetch_all(conn)
    .await?;
    Ok(ids)
}

/// A lecture needs at least one module, each existing and listed once.
async fn check_module_ids(conn: &mut SqliteConnection, module_ids: &[i64]) -> Result<()> {
    if module_ids.is_empty() {
        return Err(Error::validation("A lecture needs at least one module"));
    }
    let unique: BTreeSet<i64> = module_ids.iter().copied().collect();
    if unique.len() != module_ids.len() {
        return Err(Error::validation("A module can appear only once in a lecture"));
    }
    let mut query = QueryBuilder::<Sqlite>::new("select id from modules where id in (");
    let mut separated = query.separated(", ");
    for id in &unique {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let found: BTreeSet<i64> = query
        .build_query_scalar::<i64>()
        .fetch_all(conn)
        .await?
        .into_iter()
        .collect();
    let missing: Vec<i64> = unique.difference(&found).copied().collect();
    if !missing.is_empty() {
        return Err(Error::not_found(format!(
            "Modules not found: [{}]",
            format_ids(&missing)
        )));
    }
    Ok(())
}

async fn store_module_order(
    conn: &mut SqliteConnection,
    lecture_id: i64,
    module_ids: &[i64],
) -> Result<()> {
    sqlx::query("delete from lecture_modules where lecture_id = ?")
        .bind(lecture_id)
        .execute(&mut *conn)
        .await?;
    for (position, module_id) in module_ids.iter().enumerate() {
        sqlx::query("insert into lecture_modules (lecture_id, module_id, position) values (?, ?, ?)")
            .bind(lecture_id)
            .bind(module_id)
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Keep existing progress consistent with a new module list.
async fn reconcile_progress(
    conn: &mut SqliteConnection,
    lecture_id: i64,
    modules_count: usize,
) -> Result<()> {
    let count = modules_count as i64;
    sqlx::query(
        "delete from module_completions where lecture_id = ? and module_id not in (select module_id from lecture_modules where lecture_id = ?)",
    )
    .bind(lecture_id)
    .bind(lecture_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "update student_progress set current_module_index = min(current_module_index, ?) where lecture_id = ?",
    )
    .bind(count)
    .bind(lecture_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "update student_progress set completed_at = case
            when (select count(*) from module_completions c
                  where c.student_id = student_progress.student_id and c.lecture_id = student_progress.lecture_id) >= ?
            then coalesce(completed_at, ?)
            else null end
         where lecture_id = ?",
    )
    .bind(count)
    .bind(now())
    .bind(lecture_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Catalog {
    pub async fn create_lecture(&self, identity: &Identity, new: NewLecture) -> Result<Lecture> {
        identity.require_author()?;
        let title = required("title", &new.title)?;
        let course_name = required("course_name", &new.course_name)?;

        let mut tx = self.begin_write().await?;
        check_module_ids(&mut tx, &new.module_ids).await?;
        super::course::register_course(&mut tx, &course_name).await?;
        let id = sqlx::query(
            "insert into lectures (title, course_name, description, author_id, allow_back, published, created_at) values (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&title)
        .bind(&course_name)
        .bind(new.description.trim())
        .bind(identity.user_id)
        .bind(new.allow_back)
        .bind(new.published)
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        store_module_order(&mut tx, id, &new.module_ids).await?;
        tx.commit().await?;

        info!(
            "lecture {}-{} created by {} with modules [{}]",
            id,
            title,
            identity.user_id,
            format_ids(&new.module_ids)
        );
        self.get_lecture(id).await
    }

    pub async fn get_lecture(&self, id: i64) -> Result<Lecture> {
        let row = sqlx::query_as::<_, LectureRow>(
            "select id, title, course_name, description, author_id, published, allow_back, created_at from lectures where id = ?",
        )
        .bind(id)
        .fetch_optional(&self.database)
        .await?
        .ok_or_else(|| Error::not_found(format!("Lecture {id} not found")))?;
        let modules = sqlx::query_as::<_, LectureModule>(
            "select m.id, lm.position, m.title, m.module_type from lecture_modules lm join modules m on m.id = lm.module_id where lm.lecture_id = ? order by lm.position",
        )
        .bind(id)
        .fetch_all(&self.database)
        .await?;
        Ok(Lecture {
            id: row.id,
            title: row.title,
            course_name: row.course_name,
            description: row.description,
            author_id: row.author_id,
            published: row.published,
            allow_back: row.allow_back,
            created_at: row.created_at,
            module_ids: modules.iter().map(|m| m.id).collect(),
            modules,
        })
    }

    pub async fn list_lectures(&self, filter: &LectureFilter) -> Result<Vec<LectureSummary>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "select l.id, l.title, l.course_name, l.description, l.author_id, l.published, l.allow_back, l.created_at, \
             (select count(*) from lecture_modules lm where lm.lecture_id = l.id) as modules_count \
             from lectures l where 1 = 1",
        );
        if let Some(course) = &filter.course_name {
            query.push(" and l.course_name = ").push_bind(course.trim().to_string());
        }
        if let Some(published) = filter.published {
            query.push(" and l.published = ").push_bind(published);
        }
        query.push(" order by l.id");
        let lectures = query
            .build_query_as::<LectureSummary>()
            .fetch_all(&self.database)
            .await?;
        Ok(lectures)
    }

    pub async fn update_lecture(
        &self,
        identity: &Identity,
        id: i64,
        update: LectureUpdate,
    ) -> Result<Lecture> {
        identity.require_author()?;
        let mut lecture = self.get_lecture(id).await?;
        if let Some(title) = update.title {
            lecture.title = required("title", &title)?;
        }
        if let Some(course_name) = update.course_name {
            lecture.course_name = required("course_name", &course_name)?;
        }
        if let Some(description) = update.description {
            lecture.description = description.trim().to_string();
        }
        if let Some(allow_back) = update.allow_back {
            lecture.allow_back = allow_back;
        }
        if let Some(published) = update.published {
            lecture.published = published;
        }

        let mut tx = self.begin_write().await?;
        super::course::register_course(&mut tx, &lecture.course_name).await?;
        let result = sqlx::query(
            "update lectures set title = ?, course_name = ?, description = ?, allow_back = ?, published = ? where id = ?",
        )
        .bind(&lecture.title)
        .bind(&lecture.course_name)
        .bind(&lecture.description)
        .bind(lecture.allow_back)
        .bind(lecture.published)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Lecture {id} not found")));
        }
        if let Some(module_ids) = &update.module_ids {
            check_module_ids(&mut tx, module_ids).await?;
            store_module_order(&mut tx, id, module_ids).await?;
            reconcile_progress(&mut tx, id, module_ids.len()).await?;
        }
        tx.commit().await?;

        info!("lecture {} updated by {}", id, identity.user_id);
        self.get_lecture(id).await
    }

    /// Deletes the lecture together with all progress made in it.
    pub async fn delete_lecture(&self, identity: &Identity, id: i64) -> Result<()> {
        identity.require_author()?;
        let result = sqlx::query("delete from lectures where id = ?")
            .bind(id)
            .execute(&self.database)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Lecture {id} not found")));
        }
        info!("lecture {} deleted by {}", id, identity.user_id);
        Ok(())
    }

    /// Move the module at `index` one position up or down.
    /// Moving the first module up or the last one down changes nothing.
    pub async fn move_module(
        &self,
        identity: &Identity,
        lecture_id: i64,
        index: usize,
        direction: MoveDirection,
    ) -> Result<Lecture> {
        identity.require_author()?;
        let mut tx = self.begin_write().await?;
        let exists: bool = sqlx::query_scalar("select exists(select 1 from lectures where id = ?)")
            .bind(lecture_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(Error::not_found(format!("Lecture {lecture_id} not found")));
        }
        let mut module_ids = lecture_module_ids(&mut tx, lecture_id).await?;
        if index >= module_ids.len() {
            return Err(Error::validation(format!(
                "Lecture {lecture_id} has no module at position {index}"
            )));
        }
        let moved = match direction {
            MoveDirection::Up => move_up(&mut module_ids, index),
            MoveDirection::Down => move_down(&mut module_ids, index),
        };
        if moved {
            store_module_order(&mut tx, lecture_id, &module_ids).await?;
            info!(
                "lecture {} module order is now [{}]",
                lecture_id,
                format_ids(&module_ids)
            );
        }
        tx.commit().await?;
        self.get_lecture(lecture_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::module::tests::new_module;

    #[test]
    fn test_move_down_then_up() {
        let mut items = vec!['A', 'B', 'C'];
        assert!(move_down(&mut items, 0));
        assert_eq!(items, ['B', 'A', 'C']);
        assert!(move_up(&mut items, 1));
        assert_eq!(items, ['A', 'B', 'C']);
    }

    #[test]
    fn test_boundary_moves_are_noops() {
        let mut items = vec!['A', 'B', 'C'];
        assert!(!move_up(&mut items, 0));
        assert!(!move_down(&mut items, 2));
        assert!(!move_down(&mut items, 7));
        assert!(!move_down(&mut items, usize::MAX));
        assert!(!move_up(&mut items, usize::MAX));
        assert_eq!(items, ['A', 'B', 'C']);
        let mut empty: Vec<char> = vec![];
        assert!(!move_up(&mut empty, 0));
        assert!(!move_down(&mut empty, 0));
    }

    async fn catalog_with_modules(n: usize) -> (Catalog, Vec<i64>) {
        let catalog = Catalog::in_memory().await.unwrap();
        let teacher = Identity::teacher(1);
        let mut ids = vec![];
        for i in 0..n {
            let module = catalog
                .create_module(&teacher, new_module(&format!("Module {i}"), "Calculus", ModuleType::Text))
                .await
                .unwrap();
            ids.push(module.id);
        }
        (catalog, ids)
    }

    fn new_lecture(module_ids: Vec<i64>) -> NewLecture {
        NewLecture {
            title: "Intro".into(),
            course_name: "Calculus".into(),
            description: String::new(),
            module_ids,
            allow_back: false,
            published: false,
        }
    }

    #[tokio::test]
    async fn test_create_lecture_keeps_order() {
        let (catalog, ids) = catalog_with_modules(3).await;
        let order = vec![ids[2], ids[0], ids[1]];
        let lecture = catalog
            .create_lecture(&Identity::teacher(1), new_lecture(order.clone()))
            .await
            .unwrap();
        let fetched = catalog.get_lecture(lecture.id).await.unwrap();
        assert_eq!(fetched.module_ids, order);
        let orders: Vec<i64> = fetched.modules.iter().map(|m| m.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(fetched.modules[0].title, "Module 2");
        assert_eq!(
            serde_json::to_value(&fetched.modules[0]).unwrap(),
            serde_json::json!({ "id": ids[2], "order": 0, "title": "Module 2", "type": "text" })
        );
    }

    #[tokio::test]
    async fn test_create_lecture_validation() {
        let (catalog, ids) = catalog_with_modules(1).await;
        let teacher = Identity::teacher(1);

        let err = catalog.create_lecture(&teacher, new_lecture(vec![])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = catalog
            .create_lecture(&teacher, new_lecture(vec![ids[0], ids[0]]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut untitled = new_lecture(ids.clone());
        untitled.title = " ".into();
        let err = catalog.create_lecture(&teacher, untitled).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = catalog
            .create_lecture(&teacher, new_lecture(vec![ids[0], 41, 40]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Modules not found: [40, 41]");
        assert!(catalog.list_lectures(&LectureFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_lecture_modules() {
        let (catalog, ids) = catalog_with_modules(3).await;
        let teacher = Identity::teacher(1);
        let lecture = catalog.create_lecture(&teacher, new_lecture(ids.clone())).await.unwrap();

        let updated = catalog
            .update_lecture(
                &teacher,
                lecture.id,
                LectureUpdate {
                    module_ids: Some(vec![ids[1]]),
                    published: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.module_ids, vec![ids[1]]);
        assert!(updated.published);
        assert_eq!(updated.title, "Intro");

        let err = catalog
            .update_lecture(
                &teacher,
                lecture.id,
                LectureUpdate { module_ids: Some(vec![]), ..Default::default() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(catalog.get_lecture(lecture.id).await.unwrap().module_ids, vec![ids[1]]);
    }

    #[tokio::test]
    async fn test_referenced_module_cannot_be_deleted() {
        let (catalog, ids) = catalog_with_modules(2).await;
        let teacher = Identity::teacher(1);
        let lecture = catalog.create_lecture(&teacher, new_lecture(ids.clone())).await.unwrap();
        let err = catalog.delete_module(&teacher, ids[0]).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        catalog.delete_lecture(&teacher, lecture.id).await.unwrap();
        catalog.delete_module(&teacher, ids[0]).await.unwrap();
        assert!(matches!(
            catalog.get_lecture(lecture.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            catalog.delete_lecture(&teacher, lecture.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_move_module_in_lecture() {
        let (catalog, ids) = catalog_with_modules(3).await;
        let teacher = Identity::teacher(1);
        let lecture = catalog.create_lecture(&teacher, new_lecture(ids.clone())).await.unwrap();
        let (a, b, c) = (ids[0], ids[1], ids[2]);

        let moved = catalog.move_module(&teacher, lecture.id, 0, MoveDirection::Down).await.unwrap();
        assert_eq!(moved.module_ids, vec![b, a, c]);
        let moved = catalog.move_module(&teacher, lecture.id, 1, MoveDirection::Up).await.unwrap();
        assert_eq!(moved.module_ids, vec![a, b, c]);
        let moved = catalog.move_module(&teacher, lecture.id, 0, MoveDirection::Up).await.unwrap();
        assert_eq!(moved.module_ids, vec![a, b, c]);
        let moved = catalog.move_module(&teacher, lecture.id, 2, MoveDirection::Down).await.unwrap();
        assert_eq!(moved.module_ids, vec![a, b, c]);

        let err = catalog
            .move_module(&teacher, lecture.id, 3, MoveDirection::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_lectures() {
        let (catalog, ids) = catalog_with_modules(2).await;
        let teacher = Identity::teacher(1);
        catalog.create_lecture(&teacher, new_lecture(ids.clone())).await.unwrap();
        let mut algebra = new_lecture(vec![ids[0]]);
        algebra.course_name = "Algebra".into();
        algebra.published = true;
        catalog.create_lecture(&teacher, algebra).await.unwrap();

        let all = catalog.list_lectures(&LectureFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|l| l.modules_count).collect::<Vec<_>>(), vec![2, 1]);
        let published = catalog
            .list_lectures(&LectureFilter { published: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].course_name, "Algebra");
        let courses = catalog.list_courses().await.unwrap();
        assert!(courses.iter().any(|c| c.name == "Algebra"));
    }
}
