use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "quiz_arena";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Connection settings for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Pings tried before a connection attempt is reported as failed.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse `uri`, falling back to the `quiz_arena` database.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name: database.unwrap_or(DEFAULT_DATABASE).to_owned(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let database = std::env::var("MONGO_DB").ok();
        let mut config = Self::from_uri(&uri, database.as_deref()).await?;
        if let Some(attempts) = std::env::var("MONGO_CONNECT_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            config.connect_attempts = attempts;
        }
        Ok(config)
    }
}
