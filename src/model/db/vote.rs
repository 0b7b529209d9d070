use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use log::debug;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, VoteError};
use crate::model::{
    db::{
        choice::{Choice, ChoiceId},
        question::{Question, QuestionId},
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
};

/// Core vote data: one user's selection for one question.
///
/// The database holds at most one vote per (`user_id`, `question_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub user_id: Id,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vote
    }
}

impl Vote {
    /// The user's current vote on the given question, if any.
    pub async fn for_user(
        votes: &Coll<Vote>,
        user_id: Id,
        question_id: QuestionId,
    ) -> Result<Option<Vote>> {
        let filter = doc! {
            "user_id": user_id,
            "question_id": question_id,
        };
        Ok(votes.find_one(filter, None).await?)
    }

    /// Record `user_id`'s vote for `choice_id` on `question`, replacing any
    /// earlier vote of theirs on that question. Returns the chosen choice.
    ///
    /// Nothing is written unless the question is open at `now` and the choice
    /// belongs to it.
    pub async fn record(
        votes: &Coll<Vote>,
        choices: &Coll<Choice>,
        user_id: Id,
        question: &Question,
        choice_id: Option<ChoiceId>,
        now: DateTime<Utc>,
    ) -> std::result::Result<Choice, VoteError> {
        if !question.window().can_vote_at(now) {
            return Err(VoteError::VotingClosed);
        }
        let choice_id = choice_id.ok_or(VoteError::NoSuchChoice)?;
        let choice = Choice::find_in_question(choices, question.id, choice_id)
            .await?
            .ok_or(VoteError::NoSuchChoice)?;

        let vote = upsert(votes, user_id, question.id, choice.id).await?;
        debug!(
            "User {} voted for choice {} on question {}",
            vote.user_id, vote.choice_id, vote.question_id
        );
        Ok(choice)
    }
}

/// Atomically set the user's choice for the question, inserting the vote if
/// they have none.
async fn upsert(
    votes: &Coll<Vote>,
    user_id: Id,
    question_id: QuestionId,
    choice_id: ChoiceId,
) -> Result<Vote> {
    let filter = doc! {
        "user_id": user_id,
        "question_id": question_id,
    };
    let update = doc! {
        "$set": { "choice_id": choice_id },
    };
    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::After)
        .build();

    let result = votes
        .find_one_and_update(filter.clone(), update.clone(), options.clone())
        .await;
    let vote = match result {
        // Two concurrent first votes can both miss and race to insert. The
        // unique index rejects the loser, whose retry then matches the winner.
        Err(ref err) if is_duplicate_key_error(Err::<(), _>(err)) => {
            debug!("Retrying vote upsert for user {user_id} on question {question_id}");
            votes.find_one_and_update(filter, update, options).await?
        }
        result => result?,
    };
    vote.ok_or_else(|| {
        Error::Status(
            Status::InternalServerError,
            format!("Vote upsert for user {user_id} returned nothing"),
        )
    })
}
