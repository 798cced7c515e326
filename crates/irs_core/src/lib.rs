pub mod classify;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod feeder;
pub mod ingress;
pub mod lifecycle;
pub mod notify;
pub mod remediation;
pub mod store;
