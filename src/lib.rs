pub mod cache;

pub mod client;

pub mod error;

pub mod manager;

pub mod models;

pub mod poller;

pub use error::{Error, ResponseError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[allow(unused)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
