use log::info;
use mongodb::bson::doc;
use rocket::{
    form::Form,
    http::{Cookie, CookieJar, Status},
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
            credentials::{AdminCredentials, SignupForm, UserCredentials},
            page::{message, LoginPage, SignupPage},
        },
        db::{
            admin::Admin,
            user::{NewUser, User},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![authenticate, signup_page, signup, login_page, login, logout]
}

/// Where to go after logging in when no safe destination was given.
const DEFAULT_NEXT: &str = "/polls";

/// Only follow `next` to a path on this site.
fn safe_next(next: Option<String>) -> String {
    next.filter(|next| next.starts_with('/') && !next.starts_with("//") && !next.contains('\\'))
        .unwrap_or_else(|| DEFAULT_NEXT.to_string())
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    admins: Coll<Admin>,
    config: &State<Config>,
) -> Result<()> {
    let with_username = doc! {
        "username": &credentials.username
    };

    let admin = admins
        .find_one(with_username, None)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[get("/auth/signup")]
pub fn signup_page(flash: Option<FlashMessage<'_>>) -> Json<SignupPage> {
    Json(SignupPage {
        message: message(flash),
    })
}

#[post("/auth/signup", data = "<form>")]
pub async fn signup(
    form: Form<SignupForm>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Flash<Redirect>> {
    let user: NewUser = match form
        .into_inner()
        .into_credentials()
        .and_then(NewUser::try_from)
    {
        Ok(user) => user,
        Err(err) => return Ok(Flash::error(Redirect::to(uri!(signup_page)), err.to_string())),
    };

    let inserted = new_users.insert_one(&user, None).await;
    if is_duplicate_key_error(inserted.as_ref()) {
        return Ok(Flash::error(
            Redirect::to(uri!(signup_page)),
            "A user with that username already exists.",
        ));
    }
    let new_id: Id = inserted?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| {
            Error::Status(
                Status::InternalServerError,
                "Inserted user has no object ID".to_string(),
            )
        })?
        .into();
    let db_user = users
        .find_one(new_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {new_id}")))?;
    info!("New user {}", db_user.username);

    cookies.add(AuthToken::new(&db_user).into_cookie(config));
    Ok(Flash::success(
        Redirect::to(DEFAULT_NEXT),
        format!("Welcome, {}!", db_user.username),
    ))
}

#[get("/auth/login?<next>")]
pub fn login_page(next: Option<String>, flash: Option<FlashMessage<'_>>) -> Json<LoginPage> {
    Json(LoginPage {
        next,
        message: message(flash),
    })
}

#[post("/auth/login?<next>", data = "<credentials>")]
pub async fn login(
    next: Option<String>,
    credentials: Form<UserCredentials>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Flash<Redirect>> {
    let user = User::authenticate(&users, &credentials.username, &credentials.password).await?;
    match user {
        Some(user) => {
            cookies.add(AuthToken::new(&user).into_cookie(config));
            Ok(Flash::success(
                Redirect::to(safe_next(next)),
                format!("Logged in as {}.", user.username),
            ))
        }
        None => Ok(Flash::error(
            Redirect::to(uri!(login_page(next))),
            "Please enter a correct username and password.",
        )),
    }
}

#[post("/auth/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Redirect {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Redirect::to(DEFAULT_NEXT)
}
