//! ICY settings stored in pmoconfig
//!
//! [`IcyConfigExt`] adds typed accessors for the `icy` section of the
//! configuration to `pmoconfig::Config`.
//!
//! ```no_run
//! use pmoconfig::get_config;
//! use pmoicy::{IcyClient, IcyConfigExt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! config.set_icy_connect_timeout_secs(10)?;
//!
//! let client = IcyClient::from_config(&config)?;
//! assert_eq!(client.connect_timeout().as_secs(), 10);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::Value;

use crate::client::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT};

/// Default capacity of the metadata queue used by `subscribe_metadata`
pub const DEFAULT_METADATA_QUEUE_CAPACITY: usize = 16;

/// Default size of the buffer handed to `read`
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

const CONNECT_TIMEOUT_PATH: &[&str] = &["icy", "connect_timeout_secs"];
const USER_AGENT_PATH: &[&str] = &["icy", "user_agent"];
const MAX_REDIRECTS_PATH: &[&str] = &["icy", "max_redirects"];
const METADATA_QUEUE_PATH: &[&str] = &["icy", "metadata_queue_capacity"];
const READ_BUFFER_PATH: &[&str] = &["icy", "read_buffer_size"];

/// ICY settings on top of `pmoconfig::Config`.
///
/// Getters persist the default value when the key is missing or invalid,
/// so the saved `config.yaml` always lists every setting.
pub trait IcyConfigExt {
    /// Timeout for establishing a connection, in seconds
    fn get_icy_connect_timeout_secs(&self) -> Result<u64>;
    fn set_icy_connect_timeout_secs(&self, secs: u64) -> Result<()>;

    /// User-Agent sent to servers
    fn get_icy_user_agent(&self) -> Result<String>;
    fn set_icy_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Redirects followed before giving up
    fn get_icy_max_redirects(&self) -> Result<usize>;
    fn set_icy_max_redirects(&self, max: usize) -> Result<()>;

    /// Capacity of metadata subscription queues
    fn get_icy_metadata_queue_capacity(&self) -> Result<usize>;
    fn set_icy_metadata_queue_capacity(&self, capacity: usize) -> Result<()>;

    /// Size of the buffer used to read audio
    fn get_icy_read_buffer_size(&self) -> Result<usize>;
    fn set_icy_read_buffer_size(&self, size: usize) -> Result<()>;
}

/// Positive integer at `path`, persisting `default` when absent or invalid
fn get_positive_or_persist(config: &Config, path: &[&str], default: u64) -> Result<u64> {
    match config.get_u64_or(path, 0) {
        0 => {
            config.set_u64(path, default)?;
            Ok(default)
        }
        value => Ok(value),
    }
}

impl IcyConfigExt for Config {
    fn get_icy_connect_timeout_secs(&self) -> Result<u64> {
        get_positive_or_persist(self, CONNECT_TIMEOUT_PATH, DEFAULT_CONNECT_TIMEOUT_SECS)
    }

    fn set_icy_connect_timeout_secs(&self, secs: u64) -> Result<()> {
        self.set_u64(CONNECT_TIMEOUT_PATH, secs)
    }

    fn get_icy_user_agent(&self) -> Result<String> {
        let user_agent = self.get_string_or(USER_AGENT_PATH, "");
        if user_agent.trim().is_empty() {
            self.set_icy_user_agent(DEFAULT_USER_AGENT)?;
            return Ok(DEFAULT_USER_AGENT.to_string());
        }
        Ok(user_agent)
    }

    fn set_icy_user_agent(&self, user_agent: &str) -> Result<()> {
        self.set_value(USER_AGENT_PATH, Value::String(user_agent.to_string()))
    }

    fn get_icy_max_redirects(&self) -> Result<usize> {
        // zero is a valid limit here: never follow redirects
        const UNSET: u64 = u64::MAX;
        match self.get_u64_or(MAX_REDIRECTS_PATH, UNSET) {
            UNSET => {
                self.set_icy_max_redirects(DEFAULT_MAX_REDIRECTS)?;
                Ok(DEFAULT_MAX_REDIRECTS)
            }
            max => Ok(max as usize),
        }
    }

    fn set_icy_max_redirects(&self, max: usize) -> Result<()> {
        self.set_u64(MAX_REDIRECTS_PATH, max as u64)
    }

    fn get_icy_metadata_queue_capacity(&self) -> Result<usize> {
        get_positive_or_persist(
            self,
            METADATA_QUEUE_PATH,
            DEFAULT_METADATA_QUEUE_CAPACITY as u64,
        )
        .map(|v| v as usize)
    }

    fn set_icy_metadata_queue_capacity(&self, capacity: usize) -> Result<()> {
        self.set_u64(METADATA_QUEUE_PATH, capacity as u64)
    }

    fn get_icy_read_buffer_size(&self) -> Result<usize> {
        get_positive_or_persist(self, READ_BUFFER_PATH, DEFAULT_READ_BUFFER_SIZE as u64)
            .map(|v| v as usize)
    }

    fn set_icy_read_buffer_size(&self, size: usize) -> Result<()> {
        self.set_u64(READ_BUFFER_PATH, size as u64)
    }
}
