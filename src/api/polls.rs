use chrono::Utc;
use log::debug;
use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::Json,
    Route, State,
};

use crate::error::{Result, VoteError};
use crate::model::{
    api::{
        auth::AuthToken,
        page::{message, IndexPage, Page},
        question::{QuestionDetail, QuestionSummary},
        results::QuestionResults,
        vote::VoteForm,
    },
    db::{
        choice::Choice,
        question::{Question, QuestionId},
        user::User,
        vote::Vote,
    },
    mongodb::Coll,
};
use crate::Config;

pub fn routes() -> Vec<Route> {
    routes![root, index, detail, results, vote, vote_login_required, vote_page]
}

pub const CLOSED_MESSAGE: &str = "This poll is currently closed.";

/// Send the user back to the index, explaining that the question can't be shown.
fn not_available(question_id: QuestionId) -> Flash<Redirect> {
    Flash::error(
        Redirect::to(uri!(index)),
        format!("Poll {question_id} is not available."),
    )
}

#[get("/")]
fn root() -> Redirect {
    Redirect::to(uri!(index))
}

#[get("/polls")]
async fn index(
    questions: Coll<Question>,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Json<IndexPage>> {
    let latest = Question::published(&questions, Utc::now(), config.index_limit()).await?;
    Ok(Json(IndexPage {
        latest_question_list: latest.into_iter().map(QuestionSummary::from).collect(),
        message: message(flash),
    }))
}

#[get("/polls/<question_id>")]
async fn detail(
    question_id: QuestionId,
    token: Option<AuthToken<User>>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Page<QuestionDetail>> {
    let now = Utc::now();
    let question = match Question::find_published(&questions, question_id, now).await? {
        Some(question) => question,
        None => return Ok(Err(not_available(question_id))),
    };
    if !question.window().can_vote_at(now) {
        return Ok(Err(Flash::error(Redirect::to(uri!(index)), CLOSED_MESSAGE)));
    }

    let previously_selected = match token {
        Some(token) => Vote::for_user(&votes, token.id, question.id)
            .await?
            .map(|vote| vote.choice_id),
        None => None,
    };
    let choices = Choice::for_question(&choices, question.id).await?;

    Ok(Ok(Json(QuestionDetail {
        question: question.into(),
        choices: choices.into_iter().map(Into::into).collect(),
        previously_selected,
        message: message(flash),
    })))
}

#[get("/polls/<question_id>/results")]
async fn results(
    question_id: QuestionId,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Page<QuestionResults>> {
    let question = match Question::find_published(&questions, question_id, Utc::now()).await? {
        Some(question) => question,
        None => return Ok(Err(not_available(question_id))),
    };
    let question_choices = Choice::for_question(&choices, question.id).await?;
    let results = QuestionResults::tally(question, question_choices, &votes, message(flash)).await?;
    Ok(Ok(Json(results)))
}

#[post("/polls/<question_id>/vote", data = "<form>", rank = 1)]
async fn vote(
    question_id: QuestionId,
    token: AuthToken<User>,
    form: Form<VoteForm>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
) -> Result<Flash<Redirect>> {
    let now = Utc::now();
    let question = match Question::find_published(&questions, question_id, now).await? {
        Some(question) => question,
        None => return Ok(not_available(question_id)),
    };

    match Vote::record(&votes, &choices, token.id, &question, form.choice, now).await {
        Ok(choice) => Ok(Flash::success(
            Redirect::to(uri!(results(question_id))),
            format!("Your vote for '{}' has been saved.", choice.choice_text),
        )),
        Err(err @ VoteError::VotingClosed) => {
            Ok(Flash::error(Redirect::to(uri!(index)), err.to_string()))
        }
        Err(err @ VoteError::NoSuchChoice) => {
            debug!("Rejected vote on question {question_id} with choice {:?}", form.choice);
            Ok(Flash::error(
                Redirect::to(uri!(detail(question_id))),
                err.to_string(),
            ))
        }
        Err(VoteError::Internal(err)) => Err(err),
    }
}

/// Voting needs a logged-in user; send anyone else to log in first.
#[post("/polls/<question_id>/vote", rank = 2)]
fn vote_login_required(question_id: QuestionId) -> Redirect {
    let next = uri!(vote(question_id));
    Redirect::to(format!("{}?next={next}", uri!(crate::api::auth::login_page(_))))
}

/// Landing on the vote URL without a form, e.g. after logging in, leads back
/// to the question.
#[get("/polls/<question_id>/vote")]
fn vote_page(question_id: QuestionId) -> Flash<Redirect> {
    Flash::error(
        Redirect::to(uri!(detail(question_id))),
        VoteError::NoSuchChoice.to_string(),
    )
}
