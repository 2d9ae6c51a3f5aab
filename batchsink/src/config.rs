//! Buffering hints of the writer. They are fixed for the lifetime of a writer and validated before
//! the writer is started.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_MAX_BATCH_SIZE: usize = 500;
const DEFAULT_MAX_IN_FLIGHT_REQUESTS: usize = 50;
const DEFAULT_MAX_BUFFERED_REQUESTS: usize = 10_000;

const ENV_MAX_BATCH_SIZE: &str = "BATCHSINK_MAX_BATCH_SIZE";
const ENV_MAX_IN_FLIGHT_REQUESTS: &str = "BATCHSINK_MAX_IN_FLIGHT_REQUESTS";
const ENV_MAX_BUFFERED_REQUESTS: &str = "BATCHSINK_MAX_BUFFERED_REQUESTS";
const ENV_IN_FLIGHT_TIMEOUT_MS: &str = "BATCHSINK_IN_FLIGHT_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Maximum number of entries handed to the destination in one call.
    pub max_batch_size: usize,
    /// Maximum number of batches submitted to the destination whose completion is not yet observed.
    pub max_in_flight_requests: usize,
    /// Maximum number of entries resident in the buffer. Must be strictly greater than
    /// `max_batch_size`.
    pub max_buffered_requests: usize,
    /// How long a suspended flush or drain waits for the next completion before the writer gives
    /// up. `None` waits forever.
    pub in_flight_timeout: Option<Duration>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_in_flight_requests: DEFAULT_MAX_IN_FLIGHT_REQUESTS,
            max_buffered_requests: DEFAULT_MAX_BUFFERED_REQUESTS,
            in_flight_timeout: None,
        }
    }
}

impl WriterConfig {
    pub fn new(
        max_batch_size: usize,
        max_in_flight_requests: usize,
        max_buffered_requests: usize,
    ) -> Result<Self> {
        let config = WriterConfig {
            max_batch_size,
            max_in_flight_requests,
            max_buffered_requests,
            in_flight_timeout: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_in_flight_timeout(mut self, timeout: Duration) -> Self {
        self.in_flight_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_in_flight_requests == 0 {
            return Err(Error::Config(
                "max_in_flight_requests must be greater than 0".to_string(),
            ));
        }
        if self.max_buffered_requests == 0 {
            return Err(Error::Config(
                "max_buffered_requests must be greater than 0".to_string(),
            ));
        }
        if self.max_buffered_requests <= self.max_batch_size {
            return Err(Error::Config(format!(
                "The maximum number of requests that may be buffered ({}) should be strictly \
                greater than the maximum number of requests per batch ({})",
                self.max_buffered_requests, self.max_batch_size
            )));
        }
        if self.in_flight_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config(
                "in_flight_timeout must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the config from the environment. Unset variables keep their defaults.
    pub fn load(
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _val)| {
                [
                    ENV_MAX_BATCH_SIZE,
                    ENV_MAX_IN_FLIGHT_REQUESTS,
                    ENV_MAX_BUFFERED_REQUESTS,
                    ENV_IN_FLIGHT_TIMEOUT_MS,
                ]
                .contains(&key.as_str())
            })
            .collect();

        let parse_var = |var: &str| -> Result<Option<u64>> {
            env_vars
                .get(var)
                .map(|val| {
                    val.trim().parse::<u64>().map_err(|e| {
                        Error::Config(format!("Invalid value {val:?} for {var}: {e}"))
                    })
                })
                .transpose()
        };
        let parse_usize = |var: &str, default: usize| -> Result<usize> {
            match parse_var(var)? {
                Some(val) => usize::try_from(val)
                    .map_err(|e| Error::Config(format!("Invalid value {val} for {var}: {e}"))),
                None => Ok(default),
            }
        };

        let config = WriterConfig {
            max_batch_size: parse_usize(ENV_MAX_BATCH_SIZE, DEFAULT_MAX_BATCH_SIZE)?,
            max_in_flight_requests: parse_usize(
                ENV_MAX_IN_FLIGHT_REQUESTS,
                DEFAULT_MAX_IN_FLIGHT_REQUESTS,
            )?,
            max_buffered_requests: parse_usize(
                ENV_MAX_BUFFERED_REQUESTS,
                DEFAULT_MAX_BUFFERED_REQUESTS,
            )?,
            in_flight_timeout: parse_var(ENV_IN_FLIGHT_TIMEOUT_MS)?.map(Duration::from_millis),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WriterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_size, 500);
        assert_eq!(config.max_in_flight_requests, 50);
        assert_eq!(config.max_buffered_requests, 10_000);
        assert_eq!(config.in_flight_timeout, None);
    }

    #[test]
    fn test_new_validates() {
        assert!(WriterConfig::new(2, 1, 5).is_ok());
        assert!(WriterConfig::new(1, 1, 2).is_ok());

        // buffer must be strictly larger than a batch
        assert!(matches!(
            WriterConfig::new(5, 1, 5),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            WriterConfig::new(6, 1, 5),
            Err(Error::Config(_))
        ));

        assert!(matches!(WriterConfig::new(0, 1, 5), Err(Error::Config(_))));
        assert!(matches!(WriterConfig::new(2, 0, 5), Err(Error::Config(_))));
        assert!(matches!(WriterConfig::new(2, 1, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = WriterConfig::new(2, 1, 5)
            .unwrap()
            .with_in_flight_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_env() {
        let env_vars = [
            (ENV_MAX_BATCH_SIZE, "10"),
            (ENV_MAX_IN_FLIGHT_REQUESTS, "3"),
            (ENV_MAX_BUFFERED_REQUESTS, "100"),
            (ENV_IN_FLIGHT_TIMEOUT_MS, "2500"),
            ("UNRELATED", "ignored"),
        ];
        let config = WriterConfig::load(env_vars).unwrap();
        assert_eq!(
            config,
            WriterConfig {
                max_batch_size: 10,
                max_in_flight_requests: 3,
                max_buffered_requests: 100,
                in_flight_timeout: Some(Duration::from_millis(2500)),
            }
        );
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let config = WriterConfig::load(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, WriterConfig::default());

        let config = WriterConfig::load([(ENV_MAX_BATCH_SIZE, "20")]).unwrap();
        assert_eq!(config.max_batch_size, 20);
        assert_eq!(config.max_buffered_requests, DEFAULT_MAX_BUFFERED_REQUESTS);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let result = WriterConfig::load([(ENV_MAX_BATCH_SIZE, "lots")]);
        assert!(matches!(result, Err(Error::Config(_))));

        // parses fine but violates the buffer/batch invariant
        let result = WriterConfig::load([
            (ENV_MAX_BATCH_SIZE, "100"),
            (ENV_MAX_BUFFERED_REQUESTS, "100"),
        ]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
