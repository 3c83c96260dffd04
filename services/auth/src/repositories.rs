//! Database repositories of the authentication service

pub mod user;

pub use user::UserRepository;
