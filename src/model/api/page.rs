use rocket::{
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::Json,
};
use serde::{Deserialize, Serialize};

use crate::model::api::question::QuestionSummary;

/// A page: either its JSON view model, or a redirect elsewhere carrying a
/// message for the user.
pub type Page<T> = Result<Json<T>, Flash<Redirect>>;

/// A one-shot message left for the user by the previous request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// `"success"` or `"error"`.
    pub kind: String,
    pub text: String,
}

impl From<FlashMessage<'_>> for Message {
    fn from(flash: FlashMessage<'_>) -> Self {
        Self {
            kind: flash.kind().to_string(),
            text: flash.message().to_string(),
        }
    }
}

/// Convert an optional flash cookie into an optional message.
pub fn message(flash: Option<FlashMessage<'_>>) -> Option<Message> {
    flash.map(Message::from)
}

/// The poll index.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexPage {
    pub latest_question_list: Vec<QuestionSummary>,
    pub message: Option<Message>,
}

/// The login form.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginPage {
    /// Where to go after logging in.
    pub next: Option<String>,
    pub message: Option<Message>,
}

/// The signup form.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupPage {
    pub message: Option<Message>,
}
