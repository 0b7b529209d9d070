use crate::model::db::choice::ChoiceId;

/// The voting form. `choice` is absent when the user submitted without
/// selecting anything.
#[derive(Debug, FromForm)]
pub struct VoteForm {
    pub choice: Option<ChoiceId>,
}
