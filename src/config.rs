//! Configuration from the command line.
//!
//! tern is configured with two positional arguments:
//!
//! ```console
//! tern PORT PASSWORD
//! ```
//!
//! The advertised server name defaults to `tern.localdomain` and can be
//! overridden with the `SERVER_HOSTNAME` environment variable.

use std::{env, net, process};

const DEFAULT_DOMAIN: &str = "tern.localdomain";

/// The subset of the configuration the server state needs.
pub struct StateConfig {
    /// The domain of the server, used as the prefix of its replies.
    pub domain: String,

    /// The password clients must supply with PASS to register.
    pub password: String,
}

/// The whole server configuration.
pub struct Config {
    /// The IP and TCP port to which to bind.
    pub addr: net::SocketAddr,

    /// The connection password.
    pub password: String,

    /// The domain of the server.
    pub domain: String,
}

impl Config {
    pub fn state(&self) -> StateConfig {
        StateConfig {
            domain: self.domain.clone(),
            password: self.password.clone(),
        }
    }
}

/// Reads the configuration from the program's arguments, or exits if they
/// are missing or invalid.
pub fn from_args() -> Config {
    let matches = clap::App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            clap::Arg::with_name("PORT")
                .help("The TCP port to listen on")
                .required(true),
        )
        .arg(
            clap::Arg::with_name("PASSWORD")
                .help("The password clients connect with")
                .required(true),
        )
        .get_matches();

    let port = matches.value_of("PORT").unwrap();
    let port = port.parse().unwrap_or_else(|_| {
        eprintln!("{:?} is not a valid port number.", port);
        process::exit(1);
    });
    let password = matches.value_of("PASSWORD").unwrap().to_owned();
    let domain = env::var("SERVER_HOSTNAME").unwrap_or_else(|_| DEFAULT_DOMAIN.to_owned());

    Config {
        addr: net::SocketAddr::from(([0, 0, 0, 0], port)),
        password,
        domain,
    }
}
