// Route modules

pub mod auth;
