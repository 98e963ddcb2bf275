// Presentation layer - HTTP front-end
pub mod app_state;
pub mod handlers;
