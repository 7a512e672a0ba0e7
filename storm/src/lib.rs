pub mod args;
pub mod certs;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod keylog;
pub mod logging;
pub mod params;
pub mod qlog;
pub mod report;
pub mod runner;
pub mod transport;
pub mod trial;
pub mod utils;
