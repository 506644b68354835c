//! Batch and task definitions

use std::fmt;

/// Kind of store operation a batch performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Write `value-<db>:<i>` to `key:<i>`
    Set,
    /// Read `key:<i>` and compare it with `value-<db>:<i>`
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Get => write!(f, "get"),
        }
    }
}

/// A group of same-kind tasks over indices `0..count`.
///
/// `db` only determines the expected values; which database the keys land
/// in is decided by the store handle the batch runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub operation: Operation,
    pub db: u32,
    pub count: usize,
}

impl Batch {
    /// Write batch
    pub fn set(db: u32, count: usize) -> Self {
        Self {
            operation: Operation::Set,
            db,
            count,
        }
    }

    /// Read-and-compare batch
    pub fn get(db: u32, count: usize) -> Self {
        Self {
            operation: Operation::Get,
            db,
            count,
        }
    }

    /// Tasks of this batch in index order
    pub fn tasks(&self) -> impl Iterator<Item = Task> {
        (0..self.count).map(Task::new)
    }
}

/// One index of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub index: usize,
}

impl Task {
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// Key this task touches
    pub fn key(&self) -> String {
        task_key(self.index)
    }

    /// Value this task writes, or expects to read, for database `db`
    pub fn value(&self, db: u32) -> String {
        task_value(db, self.index)
    }
}

/// `key:<index>`
pub fn task_key(index: usize) -> String {
    format!("key:{}", index)
}

/// `value-<db>:<index>`
pub fn task_value(db: u32, index: usize) -> String {
    format!("value-{}:{}", db, index)
}
