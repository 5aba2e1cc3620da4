pub mod configuration;
pub use configuration::{CommandLine, Config};

pub mod controller;
pub use controller::{Controller, ControllerHandle};

pub mod error_handling;

pub mod image_correlation;

pub mod network;

pub mod session_management;

pub mod upload;

pub mod web_interface;
