pub mod auth;
pub mod link;
