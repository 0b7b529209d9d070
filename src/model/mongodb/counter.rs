use log::debug;
use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

use super::errors::is_duplicate_key_error;

/// Counter that allocates question IDs.
pub const QUESTION_ID_COUNTER: &str = "question_id";

/// Counter that allocates choice IDs.
pub const CHOICE_ID_COUNTER: &str = "choice_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Create a new `Counter` with the given name, starting at the given value.
    pub fn new(id: impl Into<String>, start: u32) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given name.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    format!("Failed to find counter with ID {}", id),
                )
            })?;
        Ok(counter.next)
    }
}

/// Ensure the question and choice ID counters exist, without resetting them.
///
/// This operation is idempotent.
pub async fn ensure_id_counters_exist(counters: &Coll<Counter>) -> std::result::Result<(), DbError> {
    for id in [QUESTION_ID_COUNTER, CHOICE_ID_COUNTER] {
        let result = counters.insert_one(Counter::new(id, 1), None).await;
        if is_duplicate_key_error(result.as_ref()) {
            debug!("Counter {id} already exists");
            continue;
        }
        result?;
        debug!("Created counter {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[backend_test]
    async fn counter_increment(counters: Coll<Counter>) {
        const START: u32 = 5;

        // Create a counter and insert it.
        counters
            .insert_one(Counter::new("test", START), None)
            .await
            .unwrap();

        // Get the next value.
        let next = Counter::next(&counters, "test").await.unwrap();
        assert_eq!(next, START);

        // Check the counter was incremented.
        let counter = counters
            .find_one(doc! { "_id": "test" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(counter.next, START + 1);
    }

    #[backend_test]
    async fn missing_counter_is_an_error(counters: Coll<Counter>) {
        let result = Counter::next(&counters, "no-such-counter").await;
        assert!(matches!(
            result,
            Err(Error::Status(status, _)) if status == Status::InternalServerError
        ));
    }

    #[backend_test]
    async fn ensuring_counters_does_not_reset_them(counters: Coll<Counter>) {
        // The test database has already been prepared, so the counters exist.
        let first = Counter::next(&counters, QUESTION_ID_COUNTER).await.unwrap();
        ensure_id_counters_exist(&counters).await.unwrap();
        let second = Counter::next(&counters, QUESTION_ID_COUNTER).await.unwrap();
        assert_eq!(second, first + 1);
    }
}
