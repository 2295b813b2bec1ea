pub mod cli;
pub mod command;
pub mod config;
pub mod database;
pub mod handler;
pub mod health;
pub mod hub;
pub mod provider;
