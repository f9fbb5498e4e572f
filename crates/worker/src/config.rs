use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use advex_core::classifier::ClassifierProgram;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Registry name; also prefixes every slot's claim identity.
    pub worker_name: String,
    /// Number of concurrent slots, each with prefetch = 1.
    pub slots: u32,
    /// Base URL of the front door, e.g. `http://frontdoor:8080`.
    pub front_door_url: String,
    /// Unguessable path segment of the result receiver.
    pub upload_path: String,
    /// Local scratch directory for inputs, outputs and traces.
    pub work_dir: PathBuf,
    pub classifier: ClassifierProgram,
    pub queue_poll_interval: Duration,
    /// Claims older than this are handed to another slot.
    pub queue_lease: Duration,
    pub heartbeat_interval: Duration,
    /// Timeout for each fetch or delivery request.
    pub http_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `WORKER_NAME`                 | `$HOSTNAME` or `worker`  |
    /// | `WORKER_SLOTS`                | `1`                      |
    /// | `FRONT_DOOR_URL`              | `http://localhost:8080`  |
    /// | `UPLOAD_PATH`                 | required                 |
    /// | `WORK_DIR`                    | `worker-data`            |
    /// | `CLASSIFIER_PROGRAM`          | `backend/run_adv.sh`     |
    /// | `CLASSIFIER_ARGS`             | empty                    |
    /// | `CLASSIFIER_TIME_BUDGET_SECS` | `50`                     |
    /// | `CLASSIFIER_GRACE_SECS`       | `30`                     |
    /// | `QUEUE_POLL_INTERVAL_MS`      | `1000`                   |
    /// | `QUEUE_LEASE_SECS`            | `600`                    |
    /// | `HEARTBEAT_INTERVAL_SECS`     | `30`                     |
    /// | `HTTP_TIMEOUT_SECS`           | `30`                     |
    pub fn from_env() -> Self {
        let worker_name = std::env::var("WORKER_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "worker".into());

        let slots: u32 = parse_env("WORKER_SLOTS", "1");
        assert!(slots > 0, "WORKER_SLOTS must be at least 1");

        let front_door_url = std::env::var("FRONT_DOOR_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let upload_path = std::env::var("UPLOAD_PATH")
            .expect("UPLOAD_PATH must be set")
            .trim_matches('/')
            .to_string();
        assert!(!upload_path.is_empty(), "UPLOAD_PATH must not be empty");

        let work_dir = PathBuf::from(
            std::env::var("WORK_DIR").unwrap_or_else(|_| "worker-data".into()),
        );

        let classifier = ClassifierProgram {
            program: std::env::var("CLASSIFIER_PROGRAM")
                .unwrap_or_else(|_| "backend/run_adv.sh".into()),
            leading_args: std::env::var("CLASSIFIER_ARGS")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            time_budget: Duration::from_secs(parse_env("CLASSIFIER_TIME_BUDGET_SECS", "50")),
            grace: Duration::from_secs(parse_env("CLASSIFIER_GRACE_SECS", "30")),
        };

        Self {
            worker_name,
            slots,
            front_door_url,
            upload_path,
            work_dir,
            classifier,
            queue_poll_interval: Duration::from_millis(parse_env("QUEUE_POLL_INTERVAL_MS", "1000")),
            queue_lease: Duration::from_secs(parse_env("QUEUE_LEASE_SECS", "600")),
            heartbeat_interval: Duration::from_secs(parse_env("HEARTBEAT_INTERVAL_SECS", "30")),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", "30")),
        }
    }
}

/// Read `name`, falling back to `default`, and panic on a parse failure.
fn parse_env<T>(name: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.into());
    raw.parse()
        .unwrap_or_else(|e| panic!("{name} must be a valid number, got '{raw}': {e}"))
}
