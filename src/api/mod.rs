use rocket::Route;

mod admin;
pub(crate) mod auth;
mod polls;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(polls::routes());
    routes.extend(auth::routes());
    routes.extend(admin::routes());
    routes
}
