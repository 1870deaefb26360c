pub mod attachment;
pub mod auth;
pub mod password;
pub mod token;
