pub mod collaborators;
pub mod config;
pub mod driver;
pub mod service;
