use chrono::{DateTime, Utc};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::page::Message,
    db::{
        choice::{Choice, ChoiceId},
        question::{Question, QuestionId},
    },
};

/// Maximum length of question and choice texts, in characters.
pub const MAX_TEXT_LENGTH: usize = 200;

/// Reject empty or over-long question and choice texts.
fn validate_text(what: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Status(
            Status::BadRequest,
            format!("{what} must not be empty"),
        ));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(Error::Status(
            Status::BadRequest,
            format!("{what} must be at most {MAX_TEXT_LENGTH} characters"),
        ));
    }
    Ok(())
}

/// A question specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub question_text: String,
    /// Defaults to the time of creation.
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Choice texts, in display order.
    #[serde(default)]
    pub choices: Vec<String>,
}

impl QuestionSpec {
    pub fn validate(&self) -> Result<()> {
        validate_text("Question text", &self.question_text)?;
        self.choices
            .iter()
            .try_for_each(|choice| validate_text("Choice text", choice))
    }
}

/// Changes to an existing question. Absent fields are left as they are;
/// `end_date: null` reopens the question indefinitely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionUpdate {
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default, with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
}

impl QuestionUpdate {
    pub fn validate(&self) -> Result<()> {
        match &self.question_text {
            Some(text) => validate_text("Question text", text),
            None => Ok(()),
        }
    }

    /// Apply these changes to a question.
    pub fn apply(self, question: &mut Question) {
        if let Some(question_text) = self.question_text {
            question.question_text = question_text;
        }
        if let Some(pub_date) = self.pub_date {
            question.pub_date = pub_date;
        }
        if let Some(end_date) = self.end_date {
            question.end_date = end_date;
        }
    }
}

/// Distinguish an absent field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// A new choice for an existing question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSpec {
    pub choice_text: String,
}

impl ChoiceSpec {
    pub fn validate(&self) -> Result<()> {
        validate_text("Choice text", &self.choice_text)
    }
}

/// A question as listed on the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub was_published_recently: bool,
    pub can_vote: bool,
}

impl From<Question> for QuestionSummary {
    fn from(question: Question) -> Self {
        Self {
            was_published_recently: question.was_published_recently(),
            can_vote: question.can_vote(),
            id: question.id,
            question_text: question.question_text,
            pub_date: question.pub_date,
            end_date: question.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDescription {
    pub id: ChoiceId,
    pub choice_text: String,
}

impl From<Choice> for ChoiceDescription {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice_text,
        }
    }
}

/// The voting form for a single question.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceDescription>,
    /// The requesting user's current vote, if they have one.
    pub previously_selected: Option<ChoiceId>,
    pub message: Option<Message>,
}

/// A question with all of its choices, as seen by admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDescription {
    #[serde(flatten)]
    pub question: QuestionSummary,
    pub is_published: bool,
    pub choices: Vec<ChoiceDescription>,
}

impl QuestionDescription {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            is_published: question.is_published(),
            question: question.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use rocket::serde::json::serde_json;

    #[test]
    fn spec_text_is_validated() {
        assert!(QuestionSpec::example("What's up?", &["Not much"])
            .validate()
            .is_ok());
        assert!(QuestionSpec::example("What's up?", &[]).validate().is_ok());

        let err = QuestionSpec::example("   ", &["Not much"])
            .validate()
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);

        let long = "x".repeat(MAX_TEXT_LENGTH + 1);
        let err = QuestionSpec::example("What's up?", &[&long])
            .validate()
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);

        let exact = "x".repeat(MAX_TEXT_LENGTH);
        assert!(QuestionSpec::example(&exact, &[&exact]).validate().is_ok());
    }

    #[test]
    fn spec_dates_are_optional() {
        let spec: QuestionSpec =
            serde_json::from_str(r#"{"question_text": "Tea?", "choices": ["Yes", "No"]}"#)
                .unwrap();
        assert_eq!(spec.pub_date, None);
        assert_eq!(spec.end_date, None);
        assert_eq!(spec.choices, vec!["Yes", "No"]);
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let mut question = Question::example(1, "Open?", -1);
        question.end_date = Some(Utc::now() + Duration::days(1));

        let update: QuestionUpdate =
            serde_json::from_str(r#"{"question_text": "Still open?"}"#).unwrap();
        update.apply(&mut question);
        assert_eq!(question.question_text, "Still open?");
        assert!(question.end_date.is_some());

        let update: QuestionUpdate = serde_json::from_str(r#"{"end_date": null}"#).unwrap();
        assert_eq!(update.end_date, Some(None));
        update.apply(&mut question);
        assert_eq!(question.end_date, None);
    }

    #[test]
    fn summary_reflects_window() {
        let mut question = Question::example(4, "Closed?", -3);
        question.end_date = Some(Utc::now() - Duration::days(1));
        let summary = QuestionSummary::from(question);
        assert!(!summary.can_vote);
        assert!(!summary.was_published_recently);
        assert_eq!(summary.id, 4);
    }
}
