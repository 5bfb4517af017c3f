pub mod cache;
pub mod consent;
pub mod delivery;
pub mod engine;
pub mod fields;
pub mod intent;
pub mod reply;
pub mod store;
