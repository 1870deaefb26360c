pub mod auth;
pub mod conversation;
pub mod error;
pub mod health;
pub mod note;
pub mod patient;
pub mod user;
