//! The wire shape of one `dbsched.execution` row and its conversion to/from
//! the core [`Execution`] type.

use chrono::{DateTime, Utc};
use dbsched_core::{Execution, ExecutionId};

#[derive(sqlx::FromRow)]
pub(crate) struct ExecutionRow {
    pub task_name: String,
    pub instance_id: String,
    pub data: Option<Vec<u8>>,
    pub execution_time: DateTime<Utc>,
    pub picked: bool,
    pub picked_by: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub version: i64,
}

impl From<ExecutionRow> for Execution {
    fn from(row: ExecutionRow) -> Self {
        Execution {
            id: ExecutionId::new(row.task_name, row.instance_id),
            data: row.data.unwrap_or_default(),
            execution_time: row.execution_time,
            picked: row.picked,
            picked_by: row.picked_by,
            last_heartbeat: row.last_heartbeat,
            last_success: row.last_success,
            last_failure: row.last_failure,
            consecutive_failures: row.consecutive_failures.max(0) as u32,
            version: row.version.max(1) as u64,
        }
    }
}
