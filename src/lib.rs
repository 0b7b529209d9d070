#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use config::{ConfigFairing, DatabaseFairing};
use logging::LoggerFairing;

pub use config::Config;

pub mod api;
mod config;
pub mod error;
mod logging;
pub mod model;

/// Build the server with all its routes and fairings.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
}

/// Connect to the database named in the Rocket config, for tests.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let db_uri: String = rocket::Config::figment()
        .extract_inner("db_uri")
        .expect("`db_uri` not set");
    mongodb::Client::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to test database")
}

/// A fresh database name for a test.
#[cfg(test)]
pub(crate) fn database() -> String {
    config::get_database_name()
}

/// Build a server against an existing database, for tests.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    config::prepare_database(&db)
        .await
        .expect("Could not prepare test database");
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .manage(client)
        .manage(db)
}
