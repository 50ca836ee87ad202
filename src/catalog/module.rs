use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{QueryBuilder, Sqlite};
use time::OffsetDateTime;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{Catalog, format_ids, required};
use crate::{
    error::{Error, Result},
    identity::Identity,
    utils::now,
};

/// The four kinds of learning unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ModuleType {
    Text,
    Visual,
    Question,
    Test,
}

impl ModuleType {
    pub const ALL: [ModuleType; 4] = [
        ModuleType::Text,
        ModuleType::Visual,
        ModuleType::Question,
        ModuleType::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Text => "text",
            ModuleType::Visual => "visual",
            ModuleType::Question => "question",
            ModuleType::Test => "test",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        ModuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| {
                Error::validation(format!(
                    "Unknown module type '{s}', expected one of text, visual, question, test"
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TextContent {
    pub text: String,
    /// image references shown alongside the text
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisualContent {
    /// the visualization file to load
    pub file: String,
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub config: Value,
}

fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub question: String,
    pub answers: Vec<String>,
    /// index into `answers`
    pub correct: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuestionContent {
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TestContent {
    /// minutes
    pub time_limit: u32,
    pub questions_count: u32,
    /// percent needed to pass
    pub passing_score: u8,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_answers: bool,
    #[serde(default)]
    pub show_results: bool,
    #[serde(default)]
    pub allow_retake: bool,
}

/// Module payload, its shape is decided by the module type.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ModuleContent {
    Text(TextContent),
    Visual(VisualContent),
    Question(QuestionContent),
    Test(TestContent),
}

impl ModuleContent {
    /// Interpret raw JSON as the content of `module_type` and check it.
    pub fn parse(module_type: ModuleType, value: Value) -> Result<Self> {
        fn shape<T: serde::de::DeserializeOwned>(module_type: ModuleType, value: Value) -> Result<T> {
            serde_json::from_value(value)
                .map_err(|e| Error::validation(format!("Invalid {module_type} content: {e}")))
        }
        let content = match module_type {
            ModuleType::Text => ModuleContent::Text(shape(module_type, value)?),
            ModuleType::Visual => ModuleContent::Visual(shape(module_type, value)?),
            ModuleType::Question => {
                // a bare list of questions is accepted too
                let value = match value {
                    Value::Array(_) => json!({ "questions": value }),
                    other => other,
                };
                ModuleContent::Question(shape(module_type, value)?)
            }
            ModuleType::Test => ModuleContent::Test(shape(module_type, value)?),
        };
        content.validate()?;
        Ok(content)
    }

    pub fn module_type(&self) -> ModuleType {
        match self {
            ModuleContent::Text(_) => ModuleType::Text,
            ModuleContent::Visual(_) => ModuleType::Visual,
            ModuleContent::Question(_) => ModuleType::Question,
            ModuleContent::Test(_) => ModuleType::Test,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::validation(msg));
        match self {
            ModuleContent::Text(text) => {
                if text.text.trim().is_empty() {
                    return invalid("text content must not be empty".into());
                }
            }
            ModuleContent::Visual(visual) => {
                if visual.file.trim().is_empty() {
                    return invalid("visual content needs a file".into());
                }
                if !visual.config.is_object() {
                    return invalid("visual config must be a JSON object".into());
                }
            }
            ModuleContent::Question(content) => {
                if content.questions.is_empty() {
                    return invalid("question content needs at least one question".into());
                }
                for (i, q) in content.questions.iter().enumerate() {
                    let n = i + 1;
                    if q.question.trim().is_empty() {
                        return invalid(format!("question {n} has no text"));
                    }
                    if q.answers.len() < 2 {
                        return invalid(format!("question {n} needs at least two answers"));
                    }
                    if q.correct >= q.answers.len() {
                        return invalid(format!(
                            "question {n} marks answer {} as correct but has only {} answers",
                            q.correct,
                            q.answers.len()
                        ));
                    }
                }
            }
            ModuleContent::Test(test) => {
                if test.time_limit == 0 {
                    return invalid("test time_limit must be positive".into());
                }
                if test.questions_count == 0 {
                    return invalid("test questions_count must be positive".into());
                }
                if test.passing_score > 100 {
                    return invalid("test passing_score must be between 0 and 100".into());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Module {
    pub id: i64,
    pub title: String,
    pub course: String,
    pub description: String,
    pub module_type: ModuleType,
    pub content: ModuleContent,
    pub author_id: i64,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Module without its content, used in listings.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema, sqlx::FromRow)]
pub struct ModuleSummary {
    pub id: i64,
    pub title: String,
    pub course: String,
    pub description: String,
    pub module_type: ModuleType,
    pub author_id: i64,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    title: String,
    course: String,
    description: String,
    module_type: ModuleType,
    content: String,
    author_id: i64,
    published: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<ModuleRow> for Module {
    type Error = Error;
    fn try_from(row: ModuleRow) -> Result<Self> {
        let value = serde_json::from_str::<Value>(&row.content)?;
        let content = ModuleContent::parse(row.module_type, value).map_err(|e| {
            Error::Fatal(anyhow::anyhow!("stored content of module {} is broken: {}", row.id, e))
        })?;
        Ok(Module {
            id: row.id,
            title: row.title,
            course: row.course,
            description: row.description,
            module_type: row.module_type,
            content,
            author_id: row.author_id,
            published: row.published,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewModule {
    pub title: String,
    pub course: String,
    #[serde(default)]
    pub description: String,
    /// one of text, visual, question, test
    #[serde(alias = "type")]
    pub module_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub content: Value,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ModuleUpdate {
    pub title: Option<String>,
    pub course: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,
    pub published: Option<bool>,
}

/// All given predicates must match.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ModuleFilter {
    pub course_name: Option<String>,
    pub module_type: Option<ModuleType>,
    /// case-insensitive substring of title or description
    pub search: Option<String>,
    pub published: Option<bool>,
}

const MODULE_COLUMNS: &str =
    "id, title, course, description, module_type, content, author_id, published, created_at";

impl Catalog {
    pub async fn create_module(&self, identity: &Identity, new: NewModule) -> Result<Module> {
        identity.require_author()?;
        let title = required("title", &new.title)?;
        let course = required("course", &new.course)?;
        let module_type: ModuleType = required("module_type", &new.module_type)?.parse()?;
        let content = ModuleContent::parse(module_type, new.content)?;
        let content = serde_json::to_string(&content)?;

        let mut tx = self.begin_write().await?;
        super::course::register_course(&mut tx, &course).await?;
        let id = sqlx::query(
            "insert into modules (title, course, description, module_type, content, author_id, published, created_at) values (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&title)
        .bind(&course)
        .bind(new.description.trim())
        .bind(module_type)
        .bind(content)
        .bind(identity.user_id)
        .bind(new.published)
        .bind(now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        info!("module {}-{} ({}) created by {}", id, title, module_type, identity.user_id);
        self.get_module(id).await
    }

    pub async fn get_module(&self, id: i64) -> Result<Module> {
        let row = sqlx::query_as::<_, ModuleRow>(&format!(
            "select {MODULE_COLUMNS} from modules where id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.database)
        .await?
        .ok_or_else(|| Error::not_found(format!("Module {id} not found")))?;
        row.try_into()
    }

    pub async fn update_module(
        &self,
        identity: &Identity,
        id: i64,
        update: ModuleUpdate,
    ) -> Result<Module> {
        identity.require_author()?;
        let mut module = self.get_module(id).await?;
        if let Some(title) = update.title {
            module.title = required("title", &title)?;
        }
        if let Some(course) = update.course {
            module.course = required("course", &course)?;
        }
        if let Some(description) = update.description {
            module.description = description.trim().to_string();
        }
        if let Some(content) = update.content {
            module.content = ModuleContent::parse(module.module_type, content)?;
        }
        if let Some(published) = update.published {
            module.published = published;
        }
        let content = serde_json::to_string(&module.content)?;

        let mut tx = self.begin_write().await?;
        super::course::register_course(&mut tx, &module.course).await?;
        let result = sqlx::query(
            "update modules set title = ?, course = ?, description = ?, content = ?, published = ? where id = ?",
        )
        .bind(&module.title)
        .bind(&module.course)
        .bind(&module.description)
        .bind(content)
        .bind(module.published)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Module {id} not found")));
        }
        tx.commit().await?;

        info!("module {} updated by {}", id, identity.user_id);
        Ok(module)
    }

    /// Refuses to delete a module that a lecture still uses.
    pub async fn delete_module(&self, identity: &Identity, id: i64) -> Result<()> {
        identity.require_author()?;
        let mut tx = self.begin_write().await?;
        let lecture_ids: Vec<i64> = sqlx::query_scalar(
            "select distinct lecture_id from lecture_modules where module_id = ? order by lecture_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        if !lecture_ids.is_empty() {
            return Err(Error::conflict(format!(
                "Module {id} is used by lectures [{}]",
                format_ids(&lecture_ids)
            )));
        }
        let result = sqlx::query("delete from modules where id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("Module {id} not found")));
        }
        tx.commit().await?;
        info!("module {} deleted by {}", id, identity.user_id);
        Ok(())
    }

    /// Modules matching the filter, in creation order.
    pub async fn list_modules(&self, filter: &ModuleFilter) -> Result<Vec<ModuleSummary>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "select id, title, course, description, module_type, author_id, published, created_at from modules where 1 = 1",
        );
        if let Some(course) = &filter.course_name {
            query.push(" and course = ").push_bind(course.trim().to_string());
        }
        if let Some(module_type) = filter.module_type {
            query.push(" and module_type = ").push_bind(module_type);
        }
        if let Some(published) = filter.published {
            query.push(" and published = ").push_bind(published);
        }
        query.push(" order by id");
        let mut modules = query
            .build_query_as::<ModuleSummary>()
            .fetch_all(&self.database)
            .await?;

        // sqlite's lower() only folds ascii
        if let Some(needle) = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        {
            modules.retain(|m| {
                m.title.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
            });
        }
        Ok(modules)
    }
}
