pub mod config;
pub mod document;
pub mod environment;
pub mod errors;
pub mod guard;
pub mod item;
pub mod legacy;
pub mod preprocess;
pub mod routes;
pub mod store;
pub mod upload;
pub mod yle;
