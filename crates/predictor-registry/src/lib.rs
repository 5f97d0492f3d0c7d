//! Predictor registry (C3): persisted predictor records (type, version,
//! traffic%, description, weights location), with monotone-version
//! enforcement and an optional transaction handle on every operation so
//! C4 can compose registry reads/writes atomically.
//!
//! Grounded on
//! `original_source/src/database/repositories/predictor_repository.py`.

use bson::doc;
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::Collection;
use predictor_common::{Error, Predictor, Result};
use predictor_store::{Session, Store, COLLECTION_PREDICTORS};
use tracing::info;

/// Persisted predictor records, ordered/filtered by version.
#[derive(Clone)]
pub struct Registry {
    collection: Collection<Predictor>,
}

impl Registry {
    pub fn new(store: &Store) -> Self {
        Registry {
            collection: store.collection(COLLECTION_PREDICTORS),
        }
    }

    pub async fn find(&self, prediction_type: &str, version: u32) -> Result<Option<Predictor>> {
        self.find_opt(prediction_type, version, None).await
    }

    pub async fn find_opt(
        &self,
        prediction_type: &str,
        version: u32,
        mut session: Option<&mut Session>,
    ) -> Result<Option<Predictor>> {
        let filter = doc! { "prediction_type": prediction_type, "predictor_version": version as i64 };
        let mut query = self.collection.find_one(filter);
        if let Some(session) = session.as_deref_mut() {
            query = query.session(session);
        }
        query
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("find: {e}")))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Predictor> {
        self.find_by_id_opt(id, None).await
    }

    pub async fn find_by_id_opt(&self, id: &str, mut session: Option<&mut Session>) -> Result<Predictor> {
        let filter = doc! { "id": id };
        let mut query = self.collection.find_one(filter);
        if let Some(session) = session.as_deref_mut() {
            query = query.session(session);
        }
        query
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("find_by_id: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("predictor {id}")))
    }

    /// `only_active` filters `traffic_percentage > 0`; results are ordered
    /// by `predictor_version` descending.
    pub async fn list_by_type(&self, prediction_type: &str, only_active: bool) -> Result<Vec<Predictor>> {
        self.list_by_type_opt(prediction_type, only_active, None).await
    }

    pub async fn list_by_type_opt(
        &self,
        prediction_type: &str,
        only_active: bool,
        mut session: Option<&mut Session>,
    ) -> Result<Vec<Predictor>> {
        let mut filter = doc! { "prediction_type": prediction_type };
        if only_active {
            filter.insert("traffic_percentage", doc! { "$gt": 0 });
        }
        let sort = doc! { "predictor_version": -1 };

        match session.as_deref_mut() {
            Some(session) => {
                let mut cursor = self
                    .collection
                    .find(filter)
                    .sort(sort)
                    .session(&mut *session)
                    .await
                    .map_err(|e| Error::StoreTransactionFailed(format!("list_by_type: {e}")))?;
                let mut out = Vec::new();
                while let Some(p) = cursor
                    .next(session)
                    .await
                    .transpose()
                    .map_err(|e| Error::StoreTransactionFailed(format!("list_by_type cursor: {e}")))?
                {
                    out.push(p);
                }
                Ok(out)
            }
            None => {
                let cursor = self
                    .collection
                    .find(filter)
                    .sort(sort)
                    .await
                    .map_err(|e| Error::StoreTransactionFailed(format!("list_by_type: {e}")))?;
                cursor
                    .try_collect()
                    .await
                    .map_err(|e| Error::StoreTransactionFailed(format!("list_by_type collect: {e}")))
            }
        }
    }

    pub async fn newest(&self, prediction_type: &str) -> Result<Option<Predictor>> {
        let list = self.list_by_type(prediction_type, false).await?;
        Ok(list.into_iter().next())
    }

    /// Enforces the monotone-version rule: fails `VersionRegression` if
    /// `version <= max_existing_version(type)`.
    pub async fn create(
        &self,
        prediction_type: &str,
        description: &str,
        version: u32,
        mut session: Option<&mut Session>,
    ) -> Result<Predictor> {
        let existing = self
            .list_by_type_opt(prediction_type, false, session.as_deref_mut())
            .await?;
        if let Some(max) = existing.iter().map(|p| p.predictor_version).max() {
            if version <= max {
                return Err(Error::VersionRegression(format!(
                    "{prediction_type} version {version} <= existing max {max}"
                )));
            }
        }

        let now = Utc::now();
        let predictor = Predictor {
            id: predictor_common::utils::generate_id(),
            prediction_type: prediction_type.to_string(),
            predictor_version: version,
            predictor_description: description.to_string(),
            traffic_percentage: 0,
            created_at: now,
            updated_at: now,
        };

        let mut insert = self.collection.insert_one(&predictor);
        if let Some(session) = session.as_deref_mut() {
            insert = insert.session(session);
        }
        insert
            .await
            .map_err(|e| Error::StoreTransactionFailed(format!("create: {e}")))?;

        info!(prediction_type, version, "registered new predictor");
        Ok(predictor)
    }

    /// Single-field update with `updated_at` refresh.
    pub async fn update_traffic(
        &self,
        id: &str,
        new_percentage: u32,
        mut session: Option<&mut Session>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "traffic_percentage": new_percentage as i64,
                "updated_at": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        let mut op = self.collection.update_one(doc! { "id": id }, update);
        if let Some(session) = session.as_deref_mut() {
            op = op.session(session);
        }
        op.await
            .map_err(|e| Error::StoreTransactionFailed(format!("update_traffic: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictor_shape_round_trips_through_bson() {
        let now = Utc::now();
        let predictor = Predictor {
            id: "abc".into(),
            prediction_type: "sentiment_analysis".into(),
            predictor_version: 1,
            predictor_description: "baseline".into(),
            traffic_percentage: 100,
            created_at: now,
            updated_at: now,
        };
        let doc = bson::to_document(&predictor).expect("serializes to bson");
        let back: Predictor = bson::from_document(doc).expect("deserializes back");
        assert_eq!(back, predictor);
    }
}
