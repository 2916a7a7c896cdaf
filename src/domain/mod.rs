pub mod credentials;
pub mod fields;
pub mod models;
pub mod snapshot;
