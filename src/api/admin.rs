use log::{info, warn};
use mongodb::Client;
use rocket::{serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            question::{
                ChoiceDescription, ChoiceSpec, QuestionDescription, QuestionSpec, QuestionUpdate,
            },
        },
        db::{
            admin::Admin,
            choice::{Choice, ChoiceId},
            question::{Question, QuestionId},
            vote::Vote,
        },
        mongodb::{u32_id_filter, Coll, Counter},
    },
};

pub fn routes() -> Vec<Route> {
    routes![
        get_questions,
        create_question,
        modify_question,
        delete_question,
        add_choice,
        delete_choice,
    ]
}

#[get("/admin/questions")]
async fn get_questions(
    _token: AuthToken<Admin>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
) -> Result<Json<Vec<QuestionDescription>>> {
    let mut descriptions = Vec::new();
    for question in Question::all(&questions).await? {
        let question_choices = Choice::for_question(&choices, question.id).await?;
        descriptions.push(QuestionDescription::new(question, question_choices));
    }
    Ok(Json(descriptions))
}

#[post("/admin/questions", data = "<spec>", format = "json")]
async fn create_question(
    _token: AuthToken<Admin>,
    spec: Json<QuestionSpec>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<Json<QuestionDescription>> {
    spec.validate()?;
    let (question, new_choices) =
        Question::create(db_client, &questions, &choices, &counters, spec.0).await?;
    Ok(Json(QuestionDescription::new(question, new_choices)))
}

#[put("/admin/questions/<question_id>", data = "<update>", format = "json")]
async fn modify_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    update: Json<QuestionUpdate>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
) -> Result<Json<QuestionDescription>> {
    update.validate()?;
    let mut question = questions
        .find_one(u32_id_filter(question_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Question {question_id}")))?;

    update.0.apply(&mut question);
    if matches!(question.end_date, Some(end_date) if end_date < question.pub_date) {
        warn!("Question {question_id} now closes before it is published");
    }
    questions
        .replace_one(u32_id_filter(question_id), &question, None)
        .await?;
    info!("Modified question {question_id}");

    let question_choices = Choice::for_question(&choices, question_id).await?;
    Ok(Json(QuestionDescription::new(question, question_choices)))
}

#[delete("/admin/questions/<question_id>")]
async fn delete_question(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<()> {
    if Question::delete(db_client, &questions, &choices, &votes, question_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Question {question_id}")))
    }
}

#[post("/admin/questions/<question_id>/choices", data = "<spec>", format = "json")]
async fn add_choice(
    _token: AuthToken<Admin>,
    question_id: QuestionId,
    spec: Json<ChoiceSpec>,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
) -> Result<Json<ChoiceDescription>> {
    spec.validate()?;
    let choice = Question::add_choice(
        db_client,
        &questions,
        &choices,
        &counters,
        question_id,
        spec.0.choice_text,
    )
    .await?
    .ok_or_else(|| Error::not_found(format!("Question {question_id}")))?;
    Ok(Json(choice.into()))
}

#[delete("/admin/choices/<choice_id>")]
async fn delete_choice(
    _token: AuthToken<Admin>,
    choice_id: ChoiceId,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
) -> Result<()> {
    if Choice::delete(db_client, &choices, &votes, choice_id).await? {
        Ok(())
    } else {
        Err(Error::not_found(format!("Choice {choice_id}")))
    }
}
