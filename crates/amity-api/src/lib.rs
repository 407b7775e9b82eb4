pub mod auth;
pub mod error;
pub mod friendship;
pub mod middleware;
pub mod token;
pub mod users;
