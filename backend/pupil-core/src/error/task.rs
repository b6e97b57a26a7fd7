use crate::protocol::TaskId;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum TaskError {
    #[error("Duplicate Task Error: task {task_id} already tracked {location}")]
    Duplicate {
        task_id: TaskId,
        location: ErrorLocation,
    },
}
