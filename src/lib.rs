//! Core library for music-library-migrate
pub mod config;
pub mod db;
pub mod models;
pub mod api;
pub mod catalog;
pub mod retry;
pub mod resolve;
pub mod replicate;
pub mod migrate;
pub mod util;
