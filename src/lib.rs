pub mod app;
pub mod config;
pub mod engine;
pub mod model;
pub mod nav;
pub mod services;
pub mod theme;
pub mod ui;
pub mod widgets;
