use std::fmt;

/// Failures of work run on terrain workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// No builder buffers became free within the retry budget.
    ResourcesExhausted { attempts: u32 },
    Mesher(String),
    Panicked(String),
    Spawn(String),
}

impl TaskError {
    /// Stable identifier used to collapse repeated reports.
    pub fn key(&self) -> &'static str {
        match self {
            TaskError::ResourcesExhausted { .. } => "task.resources_exhausted",
            TaskError::Mesher(_) => "task.mesher",
            TaskError::Panicked(_) => "task.panicked",
            TaskError::Spawn(_) => "task.spawn",
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::ResourcesExhausted { attempts } => write!(
                f,
                "builder buffers exhausted after {} attempts",
                attempts
            ),
            TaskError::Mesher(msg) => write!(f, "region mesher failed: {}", msg),
            TaskError::Panicked(msg) => write!(f, "terrain task panicked: {}", msg),
            TaskError::Spawn(msg) => write!(f, "failed to start terrain workers: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {}
