pub mod chat;
pub mod health;
pub mod rebuild;
pub mod sessions;
