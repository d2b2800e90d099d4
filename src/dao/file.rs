//! File-backed catalog store and append-only JSONL result writer.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::info;

use crate::dao::{
    models::{JingleEntity, QuestionEntity, ResultEntity},
    store::{CatalogStore, ResultStore, StorageError, StorageResult},
};

/// Catalog loaded once from JSON files at startup.
///
/// Lookups are in-memory clones; the catalog never changes while the server
/// runs (editing goes through the external CRUD surface and a restart).
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    questions: Arc<HashMap<u32, QuestionEntity>>,
    jingles: Arc<HashMap<u32, JingleEntity>>,
}

impl FileCatalog {
    /// Load the question and jingle catalogs from their JSON files.
    pub async fn load(questions_path: &PathBuf, jingles_path: &PathBuf) -> StorageResult<Self> {
        let questions: Vec<QuestionEntity> = read_json_list(questions_path).await?;
        let jingles: Vec<JingleEntity> = read_json_list(jingles_path).await?;
        info!(
            questions = questions.len(),
            jingles = jingles.len(),
            "catalog loaded"
        );
        Ok(Self::from_entities(questions, jingles))
    }

    /// Build a catalog directly from entity lists.
    pub fn from_entities(questions: Vec<QuestionEntity>, jingles: Vec<JingleEntity>) -> Self {
        Self {
            questions: Arc::new(questions.into_iter().map(|q| (q.id, q)).collect()),
            jingles: Arc::new(jingles.into_iter().map(|j| (j.id, j)).collect()),
        }
    }
}

async fn read_json_list<T: serde::de::DeserializeOwned>(path: &PathBuf) -> StorageResult<Vec<T>> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|err| StorageError::unavailable(format!("reading {}", path.display()), err))?;
    serde_json::from_str(&contents)
        .map_err(|err| StorageError::unavailable(format!("parsing {}", path.display()), err))
}

impl CatalogStore for FileCatalog {
    fn find_question(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let found = self.questions.get(&id).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn find_jingle(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<JingleEntity>>> {
        let found = self.jingles.get(&id).cloned();
        Box::pin(async move { Ok(found) })
    }
}

/// Result log appending one JSON document per line.
///
/// Appends are serialized through a mutex so concurrent scoring never
/// interleaves two half-written lines.
#[derive(Debug, Clone)]
pub struct JsonlResultLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonlResultLog {
    /// Create a writer appending to `path`; the file is created on first insert.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn append(path: PathBuf, lock: Arc<Mutex<()>>, line: String) -> StorageResult<()> {
        let _guard = lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| StorageError::unavailable(format!("opening {}", path.display()), err))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|err| StorageError::unavailable(format!("writing {}", path.display()), err))?;
        Ok(())
    }
}

impl ResultStore for JsonlResultLog {
    fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        let lock = self.write_lock.clone();
        Box::pin(async move {
            let mut line = serde_json::to_string(&result)
                .map_err(|err| StorageError::unavailable("serializing result".into(), err))?;
            line.push('\n');
            JsonlResultLog::append(path, lock, line).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::QuestionType;

    fn sample_question(id: u32) -> QuestionEntity {
        QuestionEntity {
            id,
            text: format!("question {id}"),
            question_type: QuestionType::Mcq,
            category: Some("general".into()),
            points: Some(20),
            answers: Some(serde_json::json!(["a", "b", "c"])),
            correct_answer: Some("b".into()),
        }
    }

    #[tokio::test]
    async fn catalog_lookup_hits_and_misses() {
        let catalog = FileCatalog::from_entities(
            vec![sample_question(7)],
            vec![JingleEntity {
                id: 3,
                name: "fanfare".into(),
                file_path: "fanfare.mp3".into(),
            }],
        );
        assert_eq!(catalog.find_question(7).await.unwrap().unwrap().id, 7);
        assert!(catalog.find_question(8).await.unwrap().is_none());
        assert_eq!(catalog.find_jingle(3).await.unwrap().unwrap().name, "fanfare");
        assert!(catalog.find_jingle(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_reads_catalog_files() {
        let dir = tempfile::tempdir().unwrap();
        let questions_path = dir.path().join("questions.json");
        let jingles_path = dir.path().join("jingles.json");
        std::fs::write(
            &questions_path,
            serde_json::to_string(&vec![sample_question(1)]).unwrap(),
        )
        .unwrap();
        std::fs::write(&jingles_path, "[]").unwrap();

        let catalog = FileCatalog::load(&questions_path, &jingles_path)
            .await
            .unwrap();
        assert!(catalog.find_question(1).await.unwrap().is_some());
        assert!(catalog.find_jingle(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn result_log_appends_one_line_per_insert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let log = JsonlResultLog::new(path.clone());

        for round in 0..2 {
            log.insert_result(ResultEntity {
                game_id: "g1".into(),
                question_id: 42,
                buzzer_id: format!("b{round}"),
                player_name: "Player".into(),
                answer: Some("Paris".into()),
                is_correct: true,
                points: 10,
                response_time_ms: 300,
                created_at: 1_700_000_000_000,
            })
            .await
            .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ResultEntity = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.buzzer_id, "b0");
    }
}
