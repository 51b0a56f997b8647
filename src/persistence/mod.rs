pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use gateway::{PersistenceGateway, Staleness};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use schema::verify_schema;
pub use store::{AssignOutcome, Store};
