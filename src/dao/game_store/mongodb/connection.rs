use std::time::Duration;

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::debug;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

const FIRST_RETRY_DELAY: Duration = Duration::from_millis(250);
const RETRY_DELAY_CAP: Duration = Duration::from_secs(5);

/// Open a client for `config` and ping the database until it answers or the
/// configured number of attempts runs out.
pub async fn open_database(config: &MongoConfig) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);
    let attempts = config.connect_attempts.max(1);
    let mut attempt = 0;
    let mut delay = FIRST_RETRY_DELAY;

    loop {
        attempt += 1;
        let Err(source) = database.run_command(doc! { "ping": 1 }).await else {
            return Ok((client, database));
        };
        if attempt >= attempts {
            return Err(MongoDaoError::InitialPing { attempts, source });
        }
        debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            database = %config.database_name,
            "MongoDB not reachable yet"
        );
        sleep(delay).await;
        delay = (delay * 2).min(RETRY_DELAY_CAP);
    }
}
