//! backit-cli: manage the email address of a backit account from the terminal

pub mod api;
pub mod cli;
pub mod identity;
pub mod logging;
pub mod paths;
pub mod settings;
