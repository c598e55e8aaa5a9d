mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Corrupt { .. } => StorageError::Corrupt {
                message: err.to_string(),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
