use std::{collections::HashMap, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoAnswerDocument, MongoQuestionDocument, MongoQuizDocument, MongoSessionAnswers,
        MongoSessionDocument, MongoTopicDocument, QUESTION_COLLECTION, QUIZ_COLLECTION,
        SESSION_COLLECTION, TOPIC_COLLECTION,
    },
};
use crate::dao::{
    game_store::GameStore,
    models::{
        DifficultyRange, GameSessionEntity, PlayerAnswerEntity, QuestionEntity, QuizEntity,
        TopicEntity,
    },
    storage::{StorageError, StorageResult},
};

/// MongoDB-backed [`GameStore`].
#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            open_database(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            open_database(&config).await?;
        info!(database = %config.database_name, "connected to MongoDB");

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, Document); 1] = [(
            QUESTION_COLLECTION,
            "topic_id",
            doc! {"topic_id": 1, "difficulty": 1},
        )];

        let database = self.database().await;
        for (collection, index, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{index}_idx")))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn find_quiz(&self, id: Uuid) -> MongoResult<Option<QuizEntity>> {
        let collection = self.collection::<MongoQuizDocument>(QUIZ_COLLECTION).await;
        collection
            .find_one(doc! {"_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUIZ_COLLECTION,
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn find_topic(&self, id: Uuid) -> MongoResult<Option<TopicEntity>> {
        let collection = self.collection::<MongoTopicDocument>(TOPIC_COLLECTION).await;
        collection
            .find_one(doc! {"_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: TOPIC_COLLECTION,
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn load_questions(
        &self,
        filter: Document,
    ) -> MongoResult<Vec<QuestionEntity>> {
        let collection = self
            .collection::<MongoQuestionDocument>(QUESTION_COLLECTION)
            .await;
        let documents: Vec<MongoQuestionDocument> = collection
            .find(filter)
            .sort(doc! {"_id": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTION_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: QUESTION_COLLECTION,
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_questions(&self, ids: Vec<Uuid>) -> MongoResult<Vec<QuestionEntity>> {
        let raw_ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let mut by_id: HashMap<Uuid, QuestionEntity> = self
            .load_questions(doc! {"_id": {"$in": raw_ids}})
            .await?
            .into_iter()
            .map(|question| (question.id, question))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_topic_questions(
        &self,
        topic_id: Uuid,
        difficulty: DifficultyRange,
    ) -> MongoResult<Vec<QuestionEntity>> {
        self.load_questions(doc! {
            "topic_id": topic_id.to_string(),
            "difficulty": {"$gte": i32::from(difficulty.min), "$lte": i32::from(difficulty.max)},
        })
        .await
    }

    async fn create_session(&self, session: GameSessionEntity) -> MongoResult<()> {
        let id = session.id.to_string();
        let quiz_id = session.quiz_id;
        let document = MongoSessionDocument::from(session);

        self.collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION,
                id: id.clone(),
                source,
            })?;

        if let Some(quiz_id) = quiz_id {
            self.collection::<MongoQuizDocument>(QUIZ_COLLECTION)
                .await
                .update_one(
                    doc! {"_id": quiz_id.to_string()},
                    doc! {"$inc": {"play_count": 1_i64}},
                )
                .await
                .map_err(|source| MongoDaoError::Write {
                    collection: QUIZ_COLLECTION,
                    id: quiz_id.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<GameSessionEntity>> {
        let collection = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await;
        collection
            .find_one(doc! {"_id": id.to_string()})
            .projection(doc! {"answers": 0})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION,
                source,
            })?
            .map(TryInto::try_into)
            .transpose()
    }

    /// Commit a session transition, and optionally the answer behind it, in
    /// one single-document update guarded by the stored version.
    ///
    /// Returns `false` when nothing matched: the version moved on, or the
    /// player already has an answer for that question.
    async fn commit_session(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
        answer: Option<PlayerAnswerEntity>,
    ) -> MongoResult<bool> {
        let id = session.id.to_string();
        let document = MongoSessionDocument::from(session);

        let mut filter = doc! {"_id": id.as_str(), "version": expected_version as i64};
        let mut update = doc! {"$set": document.state_fields()};
        if let Some(answer) = answer.map(MongoAnswerDocument::from) {
            filter.insert(
                "answers",
                doc! {"$not": {"$elemMatch": {
                    "user_id": answer.user_id.as_str(),
                    "question_id": answer.question_id.as_str(),
                }}},
            );
            update.insert("$push", doc! {"answers": answer.to_document()});
        }

        let result = self
            .collection::<Document>(SESSION_COLLECTION)
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: SESSION_COLLECTION,
                id,
                source,
            })?;

        Ok(result.matched_count > 0)
    }

    async fn list_answers(&self, session_id: Uuid) -> MongoResult<Vec<PlayerAnswerEntity>> {
        let stored = self
            .collection::<MongoSessionAnswers>(SESSION_COLLECTION)
            .await
            .find_one(doc! {"_id": session_id.to_string()})
            .projection(doc! {"answers": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: SESSION_COLLECTION,
                source,
            })?
            .unwrap_or_default();

        let mut answers = stored
            .answers
            .into_iter()
            .map(TryInto::try_into)
            .collect::<MongoResult<Vec<PlayerAnswerEntity>>>()?;
        answers.sort_by_key(|answer| answer.answered_at);
        Ok(answers)
    }
}

impl GameStore for MongoGameStore {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(id).await.map_err(Into::into) })
    }

    fn find_topic(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TopicEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_topic(id).await.map_err(Into::into) })
    }

    fn find_questions(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_questions(ids).await.map_err(Into::into) })
    }

    fn list_topic_questions(
        &self,
        topic_id: Uuid,
        difficulty: DifficultyRange,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_topic_questions(topic_id, difficulty)
                .await
                .map_err(Into::into)
        })
    }

    fn create_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_session(session).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn update_session(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            match store.commit_session(session, expected_version, None).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(StorageError::Conflict { id }),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn record_answer(
        &self,
        session: GameSessionEntity,
        expected_version: u64,
        answer: PlayerAnswerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            match store.commit_session(session, expected_version, Some(answer)).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(StorageError::Conflict { id }),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerAnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(session_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
