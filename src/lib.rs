pub mod analysis_api;
pub mod config;
pub mod display;
pub mod error;
pub mod flows;
pub mod gui;
pub mod input;
