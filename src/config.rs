//! Listener configuration.
//!
//! Read from environment variables; every value has a production default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::error::{ListenerError, Result};

/// Systems per outbound evaluator message.
pub const DEFAULT_EVAL_BATCH_SIZE: usize = 4000;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub upload_topic: String,
    pub events_topic: String,
    pub eval_topic: String,
    pub payload_tracker_topic: String,
    /// Buffered upload events that trigger an immediate flush.
    pub event_buffer_size: usize,
    pub eval_batch_size: usize,
    /// Idle interval after the last buffered event before a timeout flush.
    pub upload_eval_timeout: Duration,
    /// Uploads for systems deleted more recently than this are ignored.
    pub deletion_threshold: Duration,
    pub read_timeout: Duration,
    /// Extra attempts for a handler failing with a store error. 0 disables retries.
    pub handler_retries: u32,
    pub handler_retry_delay: Duration,
    pub enable_evaluation_requests: bool,
    pub log_level: LevelFilter,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            upload_topic: "platform.inventory.events".to_string(),
            events_topic: "platform.inventory.events".to_string(),
            eval_topic: "hostsync.evaluator.upload".to_string(),
            payload_tracker_topic: "platform.payload-status".to_string(),
            event_buffer_size: 5 * DEFAULT_EVAL_BATCH_SIZE,
            eval_batch_size: DEFAULT_EVAL_BATCH_SIZE,
            upload_eval_timeout: Duration::from_secs(10),
            deletion_threshold: Duration::from_secs(3600),
            read_timeout: Duration::from_secs(10),
            handler_retries: 0,
            handler_retry_delay: Duration::from_secs(1),
            enable_evaluation_requests: true,
            log_level: LevelFilter::Info,
        }
    }
}

impl ListenerConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let config = Self {
            upload_topic: string("UPLOAD_TOPIC", defaults.upload_topic),
            events_topic: string("EVENTS_TOPIC", defaults.events_topic),
            eval_topic: string("EVAL_TOPIC", defaults.eval_topic),
            payload_tracker_topic: string("PAYLOAD_TRACKER_TOPIC", defaults.payload_tracker_topic),
            event_buffer_size: parse_or(&lookup, "EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            eval_batch_size: parse_or(&lookup, "EVAL_BATCH_SIZE", defaults.eval_batch_size)?,
            upload_eval_timeout: millis_or(
                &lookup,
                "UPLOAD_EVAL_TIMEOUT_MS",
                defaults.upload_eval_timeout,
            )?,
            deletion_threshold: Duration::from_secs(parse_or(
                &lookup,
                "DELETION_THRESHOLD_SECS",
                defaults.deletion_threshold.as_secs(),
            )?),
            read_timeout: millis_or(&lookup, "KAFKA_READ_TIMEOUT_MS", defaults.read_timeout)?,
            handler_retries: parse_or(&lookup, "HANDLER_RETRIES", defaults.handler_retries)?,
            handler_retry_delay: millis_or(
                &lookup,
                "HANDLER_RETRY_DELAY_MS",
                defaults.handler_retry_delay,
            )?,
            enable_evaluation_requests: parse_or(
                &lookup,
                "ENABLE_EVALUATION_REQUESTS",
                defaults.enable_evaluation_requests,
            )?,
            log_level: parse_or(&lookup, "LOG_LEVEL", defaults.log_level)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(ListenerError::Config(
                "EVENT_BUFFER_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.eval_batch_size == 0 {
            return Err(ListenerError::Config(
                "EVAL_BATCH_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.upload_eval_timeout.is_zero() {
            return Err(ListenerError::Config(
                "UPLOAD_EVAL_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ListenerError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = parse_or(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}
