//! Document store gateway (C1): a thin collection abstraction over MongoDB
//! plus the transactional-block primitive C4 uses to mutate traffic
//! percentages atomically.
//!
//! Grounded on the reference system's
//! `database/repositories/base_respository.py` (generic collection wrapper)
//! and the `mongodb`/`bson` crate pair already used elsewhere in the
//! retrieved pack for document-store access.

use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use predictor_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{info, warn};

/// A boxed, borrow-scoped future, used for the transaction callback in
/// [`Store::with_transaction`] (stable Rust has no async closures yet).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const COLLECTION_PREDICTORS: &str = "predictors";
pub const COLLECTION_ARTICLE_PREDICTIONS: &str = "article_predictions";
pub const COLLECTION_METRICS: &str = "metrics";

/// A transaction handle threaded through registry/router calls that must
/// compose atomically. `None` means "run without an explicit session"
/// (still executes against the same database, just not inside a txn).
pub type Session = mongodb::ClientSession;

/// Gateway over a single Mongo database connection, shared by C3/C7/C8.
#[derive(Clone)]
pub struct Store {
    client: Client,
    db: Database,
}

impl Store {
    /// Connect to Mongo and verify reachability. Retried at startup using
    /// the ambient retry stack by the caller (`predictor-admin`'s wiring).
    pub async fn connect(mongo_url: &str, database_name: &str) -> Result<Self> {
        let options = ClientOptions::parse(mongo_url)
            .await
            .map_err(|e| Error::Configuration(format!("invalid MONGO_URL: {e}")))?;
        let client = Client::with_options(options)
            .map_err(|e| Error::StoreTransactionFailed(format!("mongo client init: {e}")))?;

        // Cheap reachability probe.
        client
            .database(database_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("mongo ping failed: {e}")))?;

        let db = client.database(database_name);
        info!(database = database_name, "connected to document store");
        Ok(Store { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.db.collection(name)
    }

    /// Create the fixed indices the wire contract names. Idempotent: creating
    /// an index that already exists with the same keys is a no-op.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let predictors: Collection<Document> = self.db.collection(COLLECTION_PREDICTORS);
        predictors
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "prediction_type": 1, "predictor_version": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("predictors unique index: {e}")))?;
        predictors
            .create_index(IndexModel::builder().keys(doc! { "prediction_type": 1 }).build())
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("predictors secondary index: {e}")))?;

        let article_predictions: Collection<Document> =
            self.db.collection(COLLECTION_ARTICLE_PREDICTIONS);
        article_predictions
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "article_id": 1, "prediction_type": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("article_predictions unique index: {e}")))?;
        article_predictions
            .create_index(IndexModel::builder().keys(doc! { "article_id": 1 }).build())
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("article_predictions secondary index: {e}")))?;

        warn!("metrics collection requires no indices per wire contract");
        Ok(())
    }

    /// Start a client session, begin a transaction, and run `operation`
    /// against it. Any error returned by `operation` aborts the
    /// transaction; no partial mutation persists.
    pub async fn with_transaction<F, T>(&self, operation: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Session) -> BoxFuture<'a, Result<T>>,
    {
        let mut session = self
            .client
            .start_session()
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("start_session: {e}")))?;
        session
            .start_transaction()
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("start_transaction: {e}")))?;

        match operation(&mut session).await {
            Ok(value) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|e| Error::StoreTransactionFailed(format!("commit: {e}")))?;
                Ok(value)
            }
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }

    /// Cheap reachability probe, reused by the admin API's health check.
    pub async fn ping(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("mongo ping failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_constants_match_wire_contract() {
        assert_eq!(COLLECTION_PREDICTORS, "predictors");
        assert_eq!(COLLECTION_ARTICLE_PREDICTIONS, "article_predictions");
        assert_eq!(COLLECTION_METRICS, "metrics");
    }
}
