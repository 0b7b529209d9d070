use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::{page::Message, question::QuestionSummary},
    db::{
        choice::{Choice, ChoiceId},
        question::Question,
        vote::Vote,
    },
    mongodb::Coll,
};

/// Vote count for one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceResult {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes: u64,
}

/// The results page of a question.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResults {
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceResult>,
    pub total_votes: u64,
    pub message: Option<Message>,
}

impl QuestionResults {
    /// Count the votes for each of the question's choices.
    pub async fn tally(
        question: Question,
        choices: Vec<Choice>,
        votes: &Coll<Vote>,
        message: Option<Message>,
    ) -> Result<Self> {
        let mut results = Vec::with_capacity(choices.len());
        for choice in choices {
            results.push(ChoiceResult {
                votes: choice.vote_count(votes).await?,
                id: choice.id,
                choice_text: choice.choice_text,
            });
        }
        Ok(Self {
            total_votes: results.iter().map(|result| result.votes).sum(),
            question: question.into(),
            choices: results,
            message,
        })
    }
}
