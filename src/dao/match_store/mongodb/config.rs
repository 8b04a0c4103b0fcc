use mongodb::options::ClientOptions;

use super::{
    connection::RetryPolicy,
    error::{MongoDaoError, MongoResult},
};

const DEFAULT_DB: &str = "dart_live";

#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Back-off for the initial ping.
    pub retry: RetryPolicy,
}

impl MongoConfig {
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
            retry: RetryPolicy::default(),
        })
    }
}
