use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration flag: {0}")]
    InvalidFlag(String),
    #[error("Invalid value for configuration flag {0}")]
    InvalidFlagValue(String),
}

/// Settings a [`FakeServer`](crate::server::FakeServer) is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Number of logical databases addressable with SELECT.
    pub databases: usize,
    /// Whether the server starts reachable. A disconnected server fails
    /// every command at the transport level.
    pub connected: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            databases: 16,
            connected: true,
        }
    }
}

impl ServerConfig {
    pub fn databases(mut self, databases: usize) -> Self {
        self.databases = databases;
        self
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Builds a configuration from command-line style flags. The first item
    /// is the program name and is skipped.
    ///
    /// Supported flags: `--databases <n>` (1 to 1024) and `--disconnected`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fakeredis::config::ServerConfig;
    ///
    /// let config = ServerConfig::from_args(["fakeredis", "--databases", "4"]).unwrap();
    /// assert_eq!(config.databases, 4);
    /// assert!(config.connected);
    /// ```
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = args.into_iter().map(Into::into).skip(1);
        let mut config = ServerConfig::default();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--databases" => {
                    let Some(value) = iter.next() else {
                        return Err(ConfigError::InvalidFlagValue(arg));
                    };

                    let databases = value
                        .parse::<usize>()
                        .map_err(|_| ConfigError::InvalidFlagValue(arg.clone()))?;

                    if !(1..=1024).contains(&databases) {
                        return Err(ConfigError::InvalidFlagValue(arg));
                    }

                    config.databases = databases;
                }
                "--disconnected" => config.connected = false,
                _ => return Err(ConfigError::InvalidFlag(arg)),
            }
        }

        Ok(config)
    }
}
