//! TUI module for terminal user interfaces

mod validator_app;

pub use validator_app::ValidatorApp;
