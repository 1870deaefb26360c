pub mod attachment;
pub mod conversation;
pub mod health;
pub mod message;
pub mod note;
pub mod pagination;
pub mod patient;
pub mod user;
