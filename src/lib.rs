//! tern, a small IRC server.
//!
//! # Usage
//!
//! tern takes the port to listen on and the connection password as
//! arguments:
//!
//! ```console
//! tern 6667 chirp
//! ```
//!
//! Logging is controlled with the `TERN_LOG` and `TERN_LOG_STYLE`
//! environment variables, see the `env_logger` documentation for their
//! format.

#![forbid(unsafe_code)]
#![warn(clippy::all, rust_2018_idioms)]

pub use crate::state::State;
use std::{env, process};

pub mod bot;
mod channel;
mod client;
pub mod config;
mod lines;
pub mod message;
mod net;
mod state;

/// The beginning of everything
pub fn start() {
    let cfg = config::from_args();

    if cfg!(debug_assertions) {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let log_settings = env_logger::Env::new()
        .filter_or("TERN_LOG", "tern=debug")
        .write_style("TERN_LOG_STYLE");
    env_logger::Builder::from_env(log_settings)
        .format(|buf, r| {
            use std::io::Write;
            writeln!(buf, "[{:<5} {}] {}", r.level(), r.target(), r.args())
        })
        .init();

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|err| {
        log::error!("Failed to start the tokio runtime: {}", err);
        process::exit(1);
    });
    let shared = State::new(cfg.state());

    runtime.spawn(net::listen(cfg.addr, shared));
    runtime.block_on(infinite());
}

fn infinite() -> impl std::future::Future<Output = ()> {
    futures::future::pending()
}
