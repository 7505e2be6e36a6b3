//! Groups history records into fixed-capacity windows.
//!
//! Service records are dropped without counting toward capacity. A window that
//! reaches capacity is sealed but only handed out when the *next* record is
//! admitted; that record's id becomes the window's `next_offset`, which the run
//! loop writes to the checkpoint. A trailing window (partial or exactly full)
//! is returned by `flush` once the history stream is exhausted.

use crate::{
    domain::{MessageId, MessageRecord, Window},
    Error, Result,
};

/// A full window together with the id of the record that closed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedWindow {
    pub window: Window,
    pub next_offset: MessageId,
}

#[derive(Debug)]
pub struct Batcher {
    capacity: usize,
    current: Window,
}

impl Batcher {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config(
                "pagination limit must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            current: Window::new(capacity),
        })
    }

    /// Number of ids buffered in the open window.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    pub fn admit(&mut self, record: MessageRecord) -> Option<SealedWindow> {
        let sealed = if self.current.is_full() {
            let window = std::mem::replace(&mut self.current, Window::new(self.capacity));
            Some(SealedWindow {
                window,
                next_offset: record.id,
            })
        } else {
            None
        };

        if !record.is_service {
            self.current.push(record.id);
        }
        sealed
    }

    pub fn flush(&mut self) -> Option<Window> {
        if self.current.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.current,
            Window::new(self.capacity),
        ))
    }
}
