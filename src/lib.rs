pub mod config;
pub mod credentials;
pub mod domain;
pub mod http;
pub mod id;
pub mod session;
pub mod state;
pub mod version;
pub mod workflow;
