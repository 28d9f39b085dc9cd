pub mod migrate;
pub mod project;
pub mod user;
