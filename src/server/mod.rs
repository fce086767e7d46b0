pub mod config;
mod http_layers;
pub mod metrics;
mod routes;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use session::UserIdentity;
