pub mod connections;
pub mod error;
pub mod health;
pub mod schedules;
pub mod variants;
