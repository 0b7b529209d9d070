use log::info;
use mongodb::{bson::doc, options::FindOptions, Client};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::{question::QuestionId, vote::Vote},
    mongodb::{u32_id_filter, Coll},
};

pub type ChoiceId = u32;

/// One selectable option under a question. Its vote count is derived from
/// the votes that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(rename = "_id")]
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
}

impl Choice {
    /// All choices of a question, in creation order.
    pub async fn for_question(choices: &Coll<Choice>, question_id: QuestionId) -> Result<Vec<Choice>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let found = choices
            .find(doc! { "question_id": question_id }, options)
            .await?
            .try_collect()
            .await?;
        Ok(found)
    }

    /// The choice with the given ID, provided it belongs to the given question.
    pub async fn find_in_question(
        choices: &Coll<Choice>,
        question_id: QuestionId,
        id: ChoiceId,
    ) -> Result<Option<Choice>> {
        let filter = doc! {
            "_id": id,
            "question_id": question_id,
        };
        Ok(choices.find_one(filter, None).await?)
    }

    /// Number of votes cast for this choice.
    pub async fn vote_count(&self, votes: &Coll<Vote>) -> Result<u64> {
        Ok(votes
            .count_documents(doc! { "choice_id": self.id }, None)
            .await?)
    }

    /// Delete a choice along with its votes. Returns false if there was no
    /// such choice.
    pub async fn delete(
        db_client: &Client,
        choices: &Coll<Choice>,
        votes: &Coll<Vote>,
        id: ChoiceId,
    ) -> Result<bool> {
        let mut session = db_client.start_session(None).await?;
        session.start_transaction(None).await?;

        let deleted = choices
            .delete_one_with_session(u32_id_filter(id), None, &mut session)
            .await?
            .deleted_count;
        if deleted == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        let vote_count = votes
            .delete_many_with_session(doc! { "choice_id": id }, None, &mut session)
            .await?
            .deleted_count;

        session.commit_transaction().await?;
        info!("Deleted choice {id} with {vote_count} votes");
        Ok(true)
    }
}
