use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use time::OffsetDateTime;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{Catalog, lecture::lecture_module_ids};
use crate::{
    error::{Error, Result},
    identity::Identity,
    utils::now,
};

/// A student's way through one lecture.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StudentProgress {
    pub student_id: i64,
    pub lecture_id: i64,
    /// position in the lecture the student is on, equals `total_modules` when done
    pub current_module_index: usize,
    pub completed_module_ids: BTreeSet<i64>,
    /// last reported score per completed module
    pub scores: BTreeMap<i64, f64>,
    pub total_modules: usize,
    pub progress_percent: u8,
    pub allow_back: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// Share of completed modules, rounded down.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (completed.min(total) * 100 / total) as u8
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CompleteModuleRequest {
    pub module_id: i64,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NavigateRequest {
    pub index: usize,
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    current_module_index: i64,
    started_at: OffsetDateTime,
    completed_at: Option<OffsetDateTime>,
    allow_back: bool,
}

#[derive(sqlx::FromRow)]
struct CompletionRow {
    module_id: i64,
    score: Option<f64>,
}

async fn lecture_exists(conn: &mut SqliteConnection, lecture_id: i64) -> Result<()> {
    let exists: bool = sqlx::query_scalar("select exists(select 1 from lectures where id = ?)")
        .bind(lecture_id)
        .fetch_one(conn)
        .await?;
    if !exists {
        return Err(Error::not_found(format!("Lecture {lecture_id} not found")));
    }
    Ok(())
}

async fn load_progress(
    conn: &mut SqliteConnection,
    lecture_id: i64,
    student_id: i64,
) -> Result<Option<StudentProgress>> {
    let Some(row) = sqlx::query_as::<_, ProgressRow>(
        "select p.current_module_index, p.started_at, p.completed_at, l.allow_back \
         from student_progress p join lectures l on l.id = p.lecture_id \
         where p.lecture_id = ? and p.student_id = ?",
    )
    .bind(lecture_id)
    .bind(student_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };
    let total_modules = lecture_module_ids(&mut *conn, lecture_id).await?.len();
    let completions = sqlx::query_as::<_, CompletionRow>(
        "select module_id, score from module_completions where lecture_id = ? and student_id = ?",
    )
    .bind(lecture_id)
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?;

    let completed_module_ids: BTreeSet<i64> = completions.iter().map(|c| c.module_id).collect();
    let scores = completions
        .iter()
        .filter_map(|c| c.score.map(|score| (c.module_id, score)))
        .collect();
    Ok(Some(StudentProgress {
        student_id,
        lecture_id,
        current_module_index: row.current_module_index.max(0) as usize,
        progress_percent: progress_percent(completed_module_ids.len(), total_modules),
        completed_module_ids,
        scores,
        total_modules,
        allow_back: row.allow_back,
        started_at: row.started_at,
        completed_at: row.completed_at,
    }))
}

async fn existing_progress(
    conn: &mut SqliteConnection,
    lecture_id: i64,
    student_id: i64,
) -> Result<StudentProgress> {
    load_progress(conn, lecture_id, student_id)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!(
                "Student {student_id} has not started lecture {lecture_id}"
            ))
        })
}

impl Catalog {
    /// Begin a lecture, or return the progress already made in it.
    pub async fn start_lecture(&self, lecture_id: i64, identity: &Identity) -> Result<StudentProgress> {
        let student_id = identity.user_id;
        let lock = self.progress_lock(student_id, lecture_id).await;
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        lecture_exists(&mut tx, lecture_id).await?;
        let inserted = sqlx::query(
            "insert or ignore into student_progress (student_id, lecture_id, current_module_index, started_at) values (?, ?, 0, ?)",
        )
        .bind(student_id)
        .bind(lecture_id)
        .bind(now())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let progress = existing_progress(&mut tx, lecture_id, student_id).await?;
        tx.commit().await?;

        if inserted > 0 {
            info!("student {} started lecture {}", student_id, lecture_id);
        }
        Ok(progress)
    }

    /// Mark a module of the lecture as done. Completing the current module
    /// moves the student on to the next one.
    pub async fn complete_module(
        &self,
        lecture_id: i64,
        module_id: i64,
        identity: &Identity,
        score: Option<f64>,
    ) -> Result<StudentProgress> {
        if let Some(score) = score {
            if !score.is_finite() || score < 0.0 {
                return Err(Error::validation(format!("Invalid score {score}")));
            }
        }
        let student_id = identity.user_id;
        let lock = self.progress_lock(student_id, lecture_id).await;
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        let progress = existing_progress(&mut tx, lecture_id, student_id).await?;
        let module_ids = lecture_module_ids(&mut tx, lecture_id).await?;
        let Some(position) = module_ids.iter().position(|id| *id == module_id) else {
            warn!(
                "student {} tried to complete module {} outside lecture {}",
                student_id, module_id, lecture_id
            );
            return Err(Error::validation(format!(
                "Module {module_id} is not part of lecture {lecture_id}"
            )));
        };

        let now = now();
        sqlx::query(
            "insert into module_completions (student_id, lecture_id, module_id, score, completed_at) values (?, ?, ?, ?, ?) \
             on conflict (student_id, lecture_id, module_id) do update set score = coalesce(excluded.score, module_completions.score)",
        )
        .bind(student_id)
        .bind(lecture_id)
        .bind(module_id)
        .bind(score)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if position == progress.current_module_index {
            sqlx::query(
                "update student_progress set current_module_index = ? where student_id = ? and lecture_id = ?",
            )
            .bind((position + 1) as i64)
            .bind(student_id)
            .bind(lecture_id)
            .execute(&mut *tx)
            .await?;
        }

        let completed: i64 = sqlx::query_scalar(
            "select count(*) from module_completions where student_id = ? and lecture_id = ?",
        )
        .bind(student_id)
        .bind(lecture_id)
        .fetch_one(&mut *tx)
        .await?;
        if completed as usize >= module_ids.len() && progress.completed_at.is_none() {
            sqlx::query(
                "update student_progress set completed_at = ? where student_id = ? and lecture_id = ?",
            )
            .bind(now)
            .bind(student_id)
            .bind(lecture_id)
            .execute(&mut *tx)
            .await?;
            info!("student {} finished lecture {}", student_id, lecture_id);
        }

        let progress = existing_progress(&mut tx, lecture_id, student_id).await?;
        tx.commit().await?;
        info!(
            "student {} completed module {} of lecture {} ({}%)",
            student_id, module_id, lecture_id, progress.progress_percent
        );
        Ok(progress)
    }

    /// Go back to an earlier position of the lecture. Only already completed
    /// modules can be revisited, and only when the lecture allows going back.
    pub async fn go_to_module(
        &self,
        lecture_id: i64,
        identity: &Identity,
        index: usize,
    ) -> Result<StudentProgress> {
        let student_id = identity.user_id;
        let lock = self.progress_lock(student_id, lecture_id).await;
        let _guard = lock.lock().await;

        let mut tx = self.begin_write().await?;
        let progress = existing_progress(&mut tx, lecture_id, student_id).await?;
        if index == progress.current_module_index {
            return Ok(progress);
        }
        if index > progress.current_module_index {
            return Err(Error::validation(format!(
                "Cannot skip ahead to position {index}, current position is {}",
                progress.current_module_index
            )));
        }
        if !progress.allow_back {
            return Err(Error::validation(format!(
                "Lecture {lecture_id} does not allow going back"
            )));
        }
        let module_ids = lecture_module_ids(&mut tx, lecture_id).await?;
        let completed = module_ids
            .get(index)
            .is_some_and(|id| progress.completed_module_ids.contains(id));
        if !completed {
            return Err(Error::validation(format!(
                "Module at position {index} is not completed yet"
            )));
        }
        sqlx::query(
            "update student_progress set current_module_index = ? where student_id = ? and lecture_id = ?",
        )
        .bind(index as i64)
        .bind(student_id)
        .bind(lecture_id)
        .execute(&mut *tx)
        .await?;
        let progress = existing_progress(&mut tx, lecture_id, student_id).await?;
        tx.commit().await?;
        Ok(progress)
    }

    pub async fn get_student_progress(
        &self,
        lecture_id: i64,
        identity: &Identity,
    ) -> Result<StudentProgress> {
        let mut conn = self.database.acquire().await?;
        existing_progress(&mut conn, lecture_id, identity.user_id).await
    }
}
