pub mod accounts;
pub mod repos;
