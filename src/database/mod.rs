pub mod literal;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;
pub mod tags;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Created, Store, StoreError};
