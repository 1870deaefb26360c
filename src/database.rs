pub mod attachment;
pub mod conversation;
pub mod message;
pub mod note;
pub mod patient;
pub mod postgres_repository;
pub mod user;
