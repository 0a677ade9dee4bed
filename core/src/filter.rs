//! Dashboard filtering and counters over a task collection.

use serde::{Deserialize, Serialize};

use crate::types::{Priority, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => !task.status,
            StatusFilter::Completed => task.status,
        }
    }
}

/// The dashboard's filter bar. The default matches every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Case-insensitive substring of the title or description.
    pub search: String,
    pub status: StatusFilter,
    /// `None` matches any priority.
    pub priority: Option<Priority>,
}

impl TaskFilter {
    pub fn status(status: StatusFilter) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.matches_search(task)
            && self.status.matches(task)
            && self.priority.map_or(true, |priority| task.priority == priority)
    }

    fn matches_search(&self, task: &Task) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        task.title.to_lowercase().contains(&needle)
            || task
                .description
                .as_deref()
                .is_some_and(|description| description.to_lowercase().contains(&needle))
    }

    /// Matching tasks, in collection order.
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        tasks.iter().filter(|task| self.matches(task)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

impl TaskStats {
    pub fn of(tasks: &[Task]) -> Self {
        let completed = tasks.iter().filter(|task| task.status).count();
        Self {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
        }
    }
}
