//! Schema migrations.
//!
//! Each migration runs exactly once per database and is recorded in the
//! `migrations` collection. They run at startup, before the indexes are
//! ensured.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Bson, Document},
    error::Error as DbError,
    Database,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::model::db::{choice::Choice, vote::Vote};

use super::{
    bson::u32_id_filter,
    collection::{Coll, MongoCollection},
    counter::{ensure_id_counters_exist, Counter},
    errors::is_duplicate_key_error,
};

/// A record of a migration that has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedMigration {
    #[serde(rename = "_id")]
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Create the question and choice ID counters.
    IdCounters,
    /// Choices used to carry an embedded `votes` counter; votes are now
    /// counted from the vote records instead.
    RemoveChoiceVoteCounters,
    /// Vote records used to reference only their choice.
    BackfillVoteQuestions,
    /// Keep only the newest vote per (user, question) so the unique index can
    /// be built.
    DedupeVotes,
}

/// All migrations, in application order.
pub const MIGRATIONS: [Migration; 4] = [
    Migration::IdCounters,
    Migration::RemoveChoiceVoteCounters,
    Migration::BackfillVoteQuestions,
    Migration::DedupeVotes,
];

impl Migration {
    pub fn name(self) -> &'static str {
        match self {
            Self::IdCounters => "0001_id_counters",
            Self::RemoveChoiceVoteCounters => "0002_remove_choice_vote_counters",
            Self::BackfillVoteQuestions => "0003_backfill_vote_questions",
            Self::DedupeVotes => "0004_dedupe_votes",
        }
    }

    /// Apply this migration. Every migration is safe to re-apply.
    pub async fn apply(self, db: &Database) -> Result<(), DbError> {
        match self {
            Self::IdCounters => ensure_id_counters_exist(&Coll::<Counter>::from_db(db)).await,
            Self::RemoveChoiceVoteCounters => remove_choice_vote_counters(db).await,
            Self::BackfillVoteQuestions => backfill_vote_questions(db).await,
            Self::DedupeVotes => dedupe_votes(db).await,
        }
    }
}

/// Apply every migration not yet recorded in the database, returning how many
/// were applied.
pub async fn run_migrations(db: &Database) -> Result<usize, DbError> {
    let applied = Coll::<AppliedMigration>::from_db(db);
    let mut count = 0;
    for migration in MIGRATIONS {
        let name = migration.name();
        if applied.find_one(doc! { "_id": name }, None).await?.is_some() {
            debug!("Migration {name} already applied");
            continue;
        }

        info!("Applying migration {name}");
        migration.apply(db).await?;

        let record = AppliedMigration {
            name: name.to_string(),
            applied_at: Utc::now(),
        };
        let result = applied.insert_one(record, None).await;
        if is_duplicate_key_error(result.as_ref()) {
            // Another instance got there first.
            warn!("Migration {name} was applied concurrently");
            continue;
        }
        result?;
        count += 1;
    }
    Ok(count)
}

async fn remove_choice_vote_counters(db: &Database) -> Result<(), DbError> {
    let choices = db.collection::<Document>(Choice::NAME);
    let result = choices
        .update_many(
            doc! { "votes": { "$exists": true } },
            doc! { "$unset": { "votes": "" } },
            None,
        )
        .await?;
    info!(
        "Removed embedded vote counters from {} choices",
        result.modified_count
    );
    Ok(())
}

async fn backfill_vote_questions(db: &Database) -> Result<(), DbError> {
    let votes = db.collection::<Document>(Vote::NAME);
    let choices = Coll::<Choice>::from_db(db);

    let mut cursor = votes
        .find(doc! { "question_id": { "$exists": false } }, None)
        .await?;
    let (mut updated, mut dropped) = (0_u64, 0_u64);
    while let Some(vote) = cursor.try_next().await? {
        let Some(vote_id) = vote.get("_id").cloned() else {
            continue;
        };
        let choice = match get_u32(&vote, "choice_id") {
            Some(choice_id) => choices.find_one(u32_id_filter(choice_id), None).await?,
            None => None,
        };
        match choice {
            Some(choice) => {
                votes
                    .update_one(
                        doc! { "_id": vote_id },
                        doc! { "$set": { "question_id": choice.question_id } },
                        None,
                    )
                    .await?;
                updated += 1;
            }
            None => {
                // The choice is gone, and with it the vote's meaning.
                votes.delete_one(doc! { "_id": vote_id }, None).await?;
                dropped += 1;
            }
        }
    }
    info!("Backfilled {updated} votes, dropped {dropped} dangling votes");
    Ok(())
}

async fn dedupe_votes(db: &Database) -> Result<(), DbError> {
    let votes = db.collection::<Document>(Vote::NAME);
    let pipeline = vec![
        doc! { "$sort": { "_id": -1 } },
        doc! {
            "$group": {
                "_id": { "user_id": "$user_id", "question_id": "$question_id" },
                "ids": { "$push": "$_id" },
            }
        },
        doc! { "$match": { "ids.1": { "$exists": true } } },
    ];

    let mut cursor = votes.aggregate(pipeline, None).await?;
    let mut removed = 0;
    while let Some(group) = cursor.try_next().await? {
        let Ok(ids) = group.get_array("ids") else {
            continue;
        };
        // Newest first, so keep the head.
        let stale: Vec<Bson> = ids.iter().skip(1).cloned().collect();
        let result = votes
            .delete_many(doc! { "_id": { "$in": stale } }, None)
            .await?;
        removed += result.deleted_count;
    }
    if removed > 0 {
        warn!("Removed {removed} duplicate votes");
    }
    Ok(())
}

/// Read an integer field that may have been stored as either BSON int width.
fn get_u32(document: &Document, key: &str) -> Option<u32> {
    match document.get(key)? {
        Bson::Int32(value) => u32::try_from(*value).ok(),
        Bson::Int64(value) => u32::try_from(*value).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mongodb::bson::oid::ObjectId;

    #[test]
    fn migration_names_are_unique_and_ordered() {
        let names: Vec<_> = MIGRATIONS.iter().map(|m| m.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn integer_fields_of_either_width() {
        let document = doc! { "a": 3_i32, "b": 4_i64, "c": -1_i32, "d": "5" };
        assert_eq!(get_u32(&document, "a"), Some(3));
        assert_eq!(get_u32(&document, "b"), Some(4));
        assert_eq!(get_u32(&document, "c"), None);
        assert_eq!(get_u32(&document, "d"), None);
        assert_eq!(get_u32(&document, "e"), None);
    }

    #[backend_test]
    async fn migrations_are_recorded_once(db: Database) {
        // The test database was prepared on setup.
        let applied = Coll::<AppliedMigration>::from_db(&db);
        let count = applied.count_documents(None, None).await.unwrap();
        assert_eq!(count, MIGRATIONS.len() as u64);

        assert_eq!(run_migrations(&db).await.unwrap(), 0);
    }

    #[backend_test]
    async fn legacy_vote_counters_are_removed(db: Database) {
        let choices = db.collection::<Document>(Choice::NAME);
        choices
            .insert_one(
                doc! { "_id": 900_u32, "question_id": 1_u32, "choice_text": "Legacy", "votes": 12 },
                None,
            )
            .await
            .unwrap();

        Migration::RemoveChoiceVoteCounters.apply(&db).await.unwrap();

        let choice = choices
            .find_one(u32_id_filter(900), None)
            .await
            .unwrap()
            .unwrap();
        assert!(choice.get("votes").is_none());
        assert_eq!(choice.get_str("choice_text").unwrap(), "Legacy");
    }

    #[backend_test]
    async fn votes_gain_their_question(db: Database) {
        let choices = db.collection::<Document>(Choice::NAME);
        choices
            .insert_one(
                doc! { "_id": 901_u32, "question_id": 77_u32, "choice_text": "A" },
                None,
            )
            .await
            .unwrap();
        let votes = db.collection::<Document>(Vote::NAME);
        let user = ObjectId::new();
        votes
            .insert_many(
                vec![
                    doc! { "user_id": user, "choice_id": 901_u32 },
                    doc! { "user_id": ObjectId::new(), "choice_id": 999_u32 },
                ],
                None,
            )
            .await
            .unwrap();

        Migration::BackfillVoteQuestions.apply(&db).await.unwrap();

        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
        let vote = votes.find_one(None, None).await.unwrap().unwrap();
        assert_eq!(vote.get_object_id("user_id").unwrap(), user);
        assert_eq!(get_u32(&vote, "question_id"), Some(77));
    }

    #[backend_test]
    async fn duplicate_votes_keep_the_newest(db: Database) {
        // The unique index is already in place, so drop it to allow duplicates.
        let votes = db.collection::<Document>(Vote::NAME);
        votes.drop_indexes(None).await.unwrap();

        let user = ObjectId::new();
        let older = ObjectId::new();
        let newer = ObjectId::new();
        votes
            .insert_many(
                vec![
                    doc! { "_id": older, "user_id": user, "question_id": 5_u32, "choice_id": 1_u32 },
                    doc! { "_id": newer, "user_id": user, "question_id": 5_u32, "choice_id": 2_u32 },
                    doc! { "user_id": user, "question_id": 6_u32, "choice_id": 3_u32 },
                ],
                None,
            )
            .await
            .unwrap();

        Migration::DedupeVotes.apply(&db).await.unwrap();

        assert_eq!(votes.count_documents(None, None).await.unwrap(), 2);
        let kept = votes
            .find_one(doc! { "user_id": user, "question_id": 5_u32 }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.get_object_id("_id").unwrap(), newer);
    }
}
