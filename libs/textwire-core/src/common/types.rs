use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Service tuning knobs, read from the environment once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Global ceiling on in-flight image payload bytes.
    pub memory_ceiling_bytes: u64,
    /// Bound of each worker's task queue. Submission blocks when the
    /// chosen worker's queue is full.
    pub queue_capacity: usize,
    /// Recreate a worker's engine after this many tasks. 0 disables.
    pub rejuvenate_tasks: u64,
    /// Optional cap on concurrently dispatched tasks per session.
    pub session_task_limit: Option<usize>,
    /// Transport message size limit, both directions.
    pub max_message_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        let session_task_limit =
            match env_or("TEXTWIRE_SESSION_TASK_LIMIT", 0usize) {
                0 => None,
                limit => Some(limit),
            };

        Self {
            memory_ceiling_bytes: env_or(
                "TEXTWIRE_MEMORY_CEILING_BYTES",
                Self::get_default_memory_ceiling_bytes(),
            ),
            queue_capacity: env_or("TEXTWIRE_QUEUE_CAPACITY", Self::get_default_queue_capacity())
                .max(1),
            rejuvenate_tasks: env_or(
                "TEXTWIRE_REJUVENATE_TASKS",
                Self::get_default_rejuvenate_tasks(),
            ),
            session_task_limit,
            max_message_bytes: Self::get_default_max_message_bytes(),
        }
    }

    pub fn get_default_memory_ceiling_bytes() -> u64 {
        500 * 1024 * 1024
    }

    pub fn get_default_queue_capacity() -> usize {
        4
    }

    pub fn get_default_rejuvenate_tasks() -> u64 {
        500
    }

    pub fn get_default_max_message_bytes() -> usize {
        100 * 1024 * 1024
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: Self::get_default_memory_ceiling_bytes(),
            queue_capacity: Self::get_default_queue_capacity(),
            rejuvenate_tasks: Self::get_default_rejuvenate_tasks(),
            session_task_limit: None,
            max_message_bytes: Self::get_default_max_message_bytes(),
        }
    }
}

fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparseable {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}
