use chrono::{DateTime, Utc};
use log::{info, warn};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime},
    options::FindOptions,
    Client,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::question::QuestionSpec,
    common::window::VotingWindow,
    db::{choice::Choice, vote::Vote},
    mongodb::{
        optional_bson_datetime, u32_id_filter, Coll, Counter, CHOICE_ID_COUNTER,
        QUESTION_ID_COUNTER,
    },
};

pub type QuestionId = u32;

/// A poll question, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub question_text: String,
    /// When the question becomes visible and open for votes.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub pub_date: DateTime<Utc>,
    /// When the question stops accepting votes, if ever.
    #[serde(default, with = "optional_bson_datetime")]
    pub end_date: Option<DateTime<Utc>>,
}

impl Question {
    pub fn window(&self) -> VotingWindow {
        VotingWindow::new(self.pub_date, self.end_date)
    }

    pub fn is_published(&self) -> bool {
        self.window().is_published_at(Utc::now())
    }

    pub fn can_vote(&self) -> bool {
        self.window().can_vote_at(Utc::now())
    }

    pub fn was_published_recently(&self) -> bool {
        self.window().was_published_recently_at(Utc::now())
    }

    /// Questions published at `now`, most recent first, optionally limited.
    pub async fn published(
        questions: &Coll<Question>,
        now: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<Vec<Question>> {
        let options = FindOptions::builder()
            .sort(doc! { "pub_date": -1, "_id": -1 })
            .limit(limit.map(i64::from))
            .build();
        let published = questions
            .find(doc! { "pub_date": { "$lte": BsonDateTime::from_chrono(now) } }, options)
            .await?
            .try_collect()
            .await?;
        Ok(published)
    }

    /// Every question regardless of publication, most recent first.
    pub async fn all(questions: &Coll<Question>) -> Result<Vec<Question>> {
        let options = FindOptions::builder()
            .sort(doc! { "pub_date": -1, "_id": -1 })
            .build();
        Ok(questions.find(None, options).await?.try_collect().await?)
    }

    /// The question with the given ID, if it exists and is published at `now`.
    pub async fn find_published(
        questions: &Coll<Question>,
        id: QuestionId,
        now: DateTime<Utc>,
    ) -> Result<Option<Question>> {
        let question = questions
            .find_one(u32_id_filter(id), None)
            .await?
            .filter(|question| question.window().is_published_at(now));
        Ok(question)
    }

    /// Create a question together with its choices. The publication date
    /// defaults to now.
    pub async fn create(
        db_client: &Client,
        questions: &Coll<Question>,
        choices: &Coll<Choice>,
        counters: &Coll<Counter>,
        spec: QuestionSpec,
    ) -> Result<(Question, Vec<Choice>)> {
        let pub_date = spec.pub_date.unwrap_or_else(Utc::now);
        if matches!(spec.end_date, Some(end_date) if end_date < pub_date) {
            warn!("Question \"{}\" closes before it is published", spec.question_text);
        }

        // IDs may be skipped if the transaction aborts, which is harmless.
        let question = Question {
            id: Counter::next(counters, QUESTION_ID_COUNTER).await?,
            question_text: spec.question_text,
            pub_date,
            end_date: spec.end_date,
        };
        let mut new_choices = Vec::with_capacity(spec.choices.len());
        for choice_text in spec.choices {
            new_choices.push(Choice {
                id: Counter::next(counters, CHOICE_ID_COUNTER).await?,
                question_id: question.id,
                choice_text,
            });
        }

        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;
        questions
            .insert_one_with_session(&question, None, &mut session)
            .await?;
        if !new_choices.is_empty() {
            choices
                .insert_many_with_session(&new_choices, None, &mut session)
                .await?;
        }
        session.commit_transaction().await?;

        info!(
            "Created question {} with {} choices",
            question.id,
            new_choices.len()
        );
        Ok((question, new_choices))
    }

    /// Delete a question along with its choices and their votes. Returns false
    /// if there was no such question.
    pub async fn delete(
        db_client: &Client,
        questions: &Coll<Question>,
        choices: &Coll<Choice>,
        votes: &Coll<Vote>,
        id: QuestionId,
    ) -> Result<bool> {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let deleted = questions
            .delete_one_with_session(u32_id_filter(id), None, &mut session)
            .await?
            .deleted_count;
        if deleted == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        let choice_count = choices
            .delete_many_with_session(doc! { "question_id": id }, None, &mut session)
            .await?
            .deleted_count;
        let vote_count = votes
            .delete_many_with_session(doc! { "question_id": id }, None, &mut session)
            .await?
            .deleted_count;

        session.commit_transaction().await?;
        info!("Deleted question {id} with {choice_count} choices and {vote_count} votes");
        Ok(true)
    }

    /// Add a choice to an existing question. Returns `None` if there is no
    /// such question.
    pub async fn add_choice(
        db_client: &Client,
        questions: &Coll<Question>,
        choices: &Coll<Choice>,
        counters: &Coll<Counter>,
        question_id: QuestionId,
        choice_text: String,
    ) -> Result<Option<Choice>> {
        let choice = Choice {
            id: Counter::next(counters, CHOICE_ID_COUNTER).await?,
            question_id,
            choice_text,
        };

        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        // Writing to the question makes a concurrent delete conflict with us,
        // so the choice cannot outlive it.
        let touched = questions
            .update_one_with_session(
                u32_id_filter(question_id),
                doc! { "$inc": { "choice_revision": 1 } },
                None,
                &mut session,
            )
            .await?
            .matched_count;
        if touched == 0 {
            session.abort_transaction().await?;
            return Ok(None);
        }
        choices
            .insert_one_with_session(&choice, None, &mut session)
            .await?;

        session.commit_transaction().await?;
        info!("Added choice {} to question {question_id}", choice.id);
        Ok(Some(choice))
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl Question {
        /// A question published `days` from now (negative for the past).
        pub fn example(id: QuestionId, question_text: &str, days: i64) -> Self {
            Self {
                id,
                question_text: question_text.to_string(),
                pub_date: Utc::now() + Duration::days(days),
                end_date: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use mongodb::bson::{from_document, to_document, Bson};

    use crate::model::db::vote::NewVote;
    use crate::model::mongodb::Id;

    #[test]
    fn default_question_can_vote() {
        let question = Question::example(1, "Now?", 0);
        assert!(question.is_published());
        assert!(question.can_vote());
        assert!(question.was_published_recently());
    }

    #[test]
    fn old_question_without_end_can_vote() {
        let question = Question::example(1, "Old?", -10);
        assert!(question.is_published());
        assert!(question.can_vote());
        assert!(!question.was_published_recently());
    }

    #[test]
    fn ended_question_cannot_vote() {
        let mut question = Question::example(1, "Over?", -10);
        question.end_date = Some(Utc::now() - Duration::seconds(1));
        assert!(question.is_published());
        assert!(!question.can_vote());
    }

    #[test]
    fn future_question_is_hidden() {
        let question = Question::example(1, "Later?", 30);
        assert!(!question.is_published());
        assert!(!question.can_vote());
        assert!(!question.was_published_recently());
    }

    #[test]
    fn stored_without_end_date() {
        let question = Question::example(3, "Stored?", 0);
        let document = to_document(&question).unwrap();
        assert!(matches!(document.get("pub_date"), Some(Bson::DateTime(_))));
        assert_eq!(document.get("end_date"), Some(&Bson::Null));

        let mut legacy = document.clone();
        legacy.remove("end_date");
        let question: Question = from_document(legacy).unwrap();
        assert_eq!(question.end_date, None);
    }

    #[backend_test]
    async fn published_questions_newest_first(questions: Coll<Question>) {
        questions
            .insert_many(
                vec![
                    Question::example(1, "Past question 1.", -30),
                    Question::example(2, "Future question.", 30),
                    Question::example(3, "Past question 2.", -5),
                ],
                None,
            )
            .await
            .unwrap();

        let published = Question::published(&questions, Utc::now(), None)
            .await
            .unwrap();
        let ids: Vec<_> = published.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let limited = Question::published(&questions, Utc::now(), Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, 3);

        assert_eq!(Question::all(&questions).await.unwrap().len(), 3);
    }

    #[backend_test]
    async fn find_published_hides_future(questions: Coll<Question>) {
        questions
            .insert_many(
                vec![
                    Question::example(1, "Past.", -5),
                    Question::example(2, "Future.", 5),
                ],
                None,
            )
            .await
            .unwrap();

        let now = Utc::now();
        assert!(Question::find_published(&questions, 1, now)
            .await
            .unwrap()
            .is_some());
        assert!(Question::find_published(&questions, 2, now)
            .await
            .unwrap()
            .is_none());
        assert!(Question::find_published(&questions, 3, now)
            .await
            .unwrap()
            .is_none());
    }

    #[backend_test]
    async fn delete_cascades(
        questions: Coll<Question>,
        choices: Coll<Choice>,
        counters: Coll<Counter>,
        new_votes: Coll<NewVote>,
        votes: Coll<Vote>,
    ) {
        let db_client = crate::db_client().await;
        let (question, created) = Question::create(
            &db_client,
            &questions,
            &choices,
            &counters,
            QuestionSpec::example("Delete me?", &["Yes", "No"]),
        )
        .await
        .unwrap();
        let (other, _) = Question::create(
            &db_client,
            &questions,
            &choices,
            &counters,
            QuestionSpec::example("Keep me?", &["Yes"]),
        )
        .await
        .unwrap();
        new_votes
            .insert_one(
                NewVote {
                    user_id: Id::new(),
                    question_id: question.id,
                    choice_id: created[0].id,
                },
                None,
            )
            .await
            .unwrap();

        assert!(Question::delete(&db_client, &questions, &choices, &votes, question.id)
            .await
            .unwrap());
        assert!(!Question::delete(&db_client, &questions, &choices, &votes, question.id)
            .await
            .unwrap());

        assert_eq!(questions.count_documents(None, None).await.unwrap(), 1);
        assert_eq!(
            choices
                .count_documents(doc! { "question_id": question.id }, None)
                .await
                .unwrap(),
            0
        );
        assert_eq!(votes.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(Choice::for_question(&choices, other.id).await.unwrap().len(), 1);
    }

    #[backend_test]
    async fn add_choice_needs_existing_question(
        questions: Coll<Question>,
        choices: Coll<Choice>,
        counters: Coll<Counter>,
        votes: Coll<Vote>,
    ) {
        let db_client = crate::db_client().await;
        let (question, _) = Question::create(
            &db_client,
            &questions,
            &choices,
            &counters,
            QuestionSpec::example("More options?", &["One"]),
        )
        .await
        .unwrap();

        let added = Question::add_choice(
            &db_client,
            &questions,
            &choices,
            &counters,
            question.id,
            "Two".to_string(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(added.question_id, question.id);
        let texts: Vec<_> = Choice::for_question(&choices, question.id)
            .await
            .unwrap()
            .into_iter()
            .map(|choice| choice.choice_text)
            .collect();
        assert_eq!(texts, vec!["One", "Two"]);

        // Still readable after the bookkeeping write.
        let stored = Question::find_published(&questions, question.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.question_text, "More options?");

        // Once the question is gone, no choice can be attached to it.
        assert!(Question::delete(&db_client, &questions, &choices, &votes, question.id)
            .await
            .unwrap());
        let orphan = Question::add_choice(
            &db_client,
            &questions,
            &choices,
            &counters,
            question.id,
            "Three".to_string(),
        )
        .await
        .unwrap();
        assert!(orphan.is_none());
        assert_eq!(
            choices
                .count_documents(doc! { "question_id": question.id }, None)
                .await
                .unwrap(),
            0
        );
    }
}
