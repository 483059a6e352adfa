pub mod cache;
pub mod error;
pub mod ports;
pub mod service;
pub mod shaping;
pub mod single_flight;
