//! Configuration validation.

use crate::schema::{ChannelBackend, Config, Environment};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_database(config, &mut result);
        Self::validate_channel(config, &mut result);
        Self::validate_engine(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_database(config: &Config, result: &mut ValidationResult) {
        match config.database.path.as_deref() {
            Some("") => result.add_error(ValidationError::new(
                "database.path",
                "Path cannot be empty; omit it to keep state in memory",
            )),
            None if config.service.environment == Environment::Production => {
                result.add_warning(ValidationWarning::new(
                    "database.path",
                    "No database path set in production, instance state will not survive a restart",
                ));
            }
            _ => {}
        }
    }

    fn validate_channel(config: &Config, result: &mut ValidationResult) {
        let channel = &config.channel;

        if channel.partitions == 0 {
            result.add_error(ValidationError::new(
                "channel.partitions",
                "partitions must be at least 1",
            ));
        } else if channel.partitions > 1024 {
            result.add_warning(ValidationWarning::new(
                "channel.partitions",
                "partitions is very high (>1024), every partition is polled on each receive",
            ));
        }

        if channel.task_topic.trim().is_empty() {
            result.add_error(ValidationError::new("channel.task_topic", "Topic cannot be empty"));
        }
        if channel.completion_topic.trim().is_empty() {
            result.add_error(ValidationError::new(
                "channel.completion_topic",
                "Topic cannot be empty",
            ));
        }
        if channel.task_topic == channel.completion_topic {
            result.add_error(ValidationError::new(
                "channel.completion_topic",
                "Task and completion topics must differ",
            ));
        }
        if channel.consumer_group.trim().is_empty() {
            result.add_error(ValidationError::new(
                "channel.consumer_group",
                "Consumer group cannot be empty",
            ));
        }

        match channel.backend {
            ChannelBackend::Sqlite => {
                if channel.path.as_deref().is_none_or(str::is_empty) {
                    result.add_error(ValidationError::new(
                        "channel.path",
                        "The sqlite backend requires a path",
                    ));
                }
                if channel.poll_interval_ms == 0 {
                    result.add_error(ValidationError::new(
                        "channel.poll_interval_ms",
                        "poll_interval_ms must be greater than 0",
                    ));
                }
            }
            ChannelBackend::Memory => {
                if config.service.environment == Environment::Production {
                    result.add_warning(ValidationWarning::new(
                        "channel.backend",
                        "The memory channel loses undelivered events on restart",
                    ));
                }
            }
        }
    }

    fn validate_engine(config: &Config, result: &mut ValidationResult) {
        let engine = &config.engine;

        if engine.member_count == 0 {
            result.add_error(ValidationError::new(
                "engine.member_count",
                "member_count must be at least 1",
            ));
        } else if engine.member_index >= engine.member_count {
            result.add_error(ValidationError::new(
                "engine.member_index",
                format!(
                    "member_index {} is out of range for member_count {}",
                    engine.member_index, engine.member_count
                ),
            ));
        }

        if engine.member_count > config.channel.partitions && config.channel.partitions > 0 {
            result.add_warning(ValidationWarning::new(
                "engine.member_count",
                "More consumers than partitions, some members will own no partition",
            ));
        }

        if !engine.dedup_ledger {
            result.add_warning(ValidationWarning::new(
                "engine.dedup_ledger",
                "Redelivered completions may dispatch the next task more than once",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', expected one of: {}",
                    config.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        if config.logging.directory.is_some() && config.logging.max_log_files == 0 {
            result.add_error(ValidationError::new(
                "logging.max_log_files",
                "max_log_files must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
