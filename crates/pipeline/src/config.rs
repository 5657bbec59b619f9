use std::path::PathBuf;

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::store::DEFAULT_HISTORY_CAPACITY;

/// Service name of the crane's onboard digital IO module.
pub const DEFAULT_IO_SERVICE: &str = "onboard_io";

/// Ingestion pipeline configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single crane installation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of batches waiting for the processor.
    pub queue_capacity: usize,
    /// Number of committed batches kept in the snapshot history.
    pub history_capacity: usize,
    /// Lower-cased names of services whose points feed the operation counter.
    pub io_services: Vec<String>,
    /// Snapshots buffered per live subscriber before it is dropped.
    pub subscriber_buffer: usize,
    /// Process (true) or discard (false) queued batches at shutdown.
    pub drain_on_shutdown: bool,
    /// Append committed batches as JSON lines to this file, if set.
    pub persist_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default       |
    /// |---------------------|---------------|
    /// | `QUEUE_CAPACITY`    | `1000`        |
    /// | `HISTORY_CAPACITY`  | `100`         |
    /// | `IO_SERVICES`       | `onboard_io`  |
    /// | `SUBSCRIBER_BUFFER` | `16`          |
    /// | `DRAIN_ON_SHUTDOWN` | `true`        |
    /// | `PERSIST_PATH`      | unset         |
    pub fn from_env() -> Self {
        let queue_capacity: usize = std::env::var("QUEUE_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_QUEUE_CAPACITY.to_string())
            .parse()
            .expect("QUEUE_CAPACITY must be a valid usize");

        let history_capacity: usize = std::env::var("HISTORY_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_HISTORY_CAPACITY.to_string())
            .parse()
            .expect("HISTORY_CAPACITY must be a valid usize");

        let io_services = parse_service_list(
            &std::env::var("IO_SERVICES").unwrap_or_else(|_| DEFAULT_IO_SERVICE.into()),
        );

        let subscriber_buffer: usize = std::env::var("SUBSCRIBER_BUFFER")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("SUBSCRIBER_BUFFER must be a valid usize");

        let drain_on_shutdown: bool = std::env::var("DRAIN_ON_SHUTDOWN")
            .unwrap_or_else(|_| "true".into())
            .parse()
            .expect("DRAIN_ON_SHUTDOWN must be true or false");

        let persist_path = std::env::var("PERSIST_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            queue_capacity,
            history_capacity,
            io_services,
            subscriber_buffer,
            drain_on_shutdown,
            persist_path,
        }
    }

    /// Whether points of `service_name` are counted as movement controls.
    pub fn is_io_governed(&self, service_name: &str) -> bool {
        let name = service_name.to_ascii_lowercase();
        self.io_services.iter().any(|s| *s == name)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            io_services: vec![DEFAULT_IO_SERVICE.to_string()],
            subscriber_buffer: 16,
            drain_on_shutdown: true,
            persist_path: None,
        }
    }
}

fn parse_service_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
