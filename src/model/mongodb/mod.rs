mod bson;
mod collection;
mod counter;
mod errors;
mod migrations;

pub use bson::{optional_bson_datetime, u32_id_filter, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_id_counters_exist, Counter, CHOICE_ID_COUNTER, QUESTION_ID_COUNTER};
pub use errors::is_duplicate_key_error;
pub use migrations::{run_migrations, AppliedMigration, MIGRATIONS};
