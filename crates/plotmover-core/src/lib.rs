pub mod config;
pub mod error;
pub mod logging;
pub mod mover;
pub mod registry;
pub mod scanner;
pub mod shutdown;
pub mod space;
pub mod transfer;
pub mod worker;
