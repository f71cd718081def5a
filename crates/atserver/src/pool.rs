//! Bounded parameter lists and response queues.

use std::collections::VecDeque;

use crate::error::{AtError, AtResult};

/// Ordered parameters captured for one command invocation.
#[derive(Debug, Clone)]
pub struct ParameterList {
    items: Vec<String>,
    max_count: usize,
    max_length: usize,
}

impl ParameterList {
    /// Create an empty list with the given bounds.
    pub fn new(max_count: usize, max_length: usize) -> Self {
        ParameterList {
            items: Vec::new(),
            max_count,
            max_length,
        }
    }

    /// Append a parameter.
    pub fn push(&mut self, param: String) -> AtResult<()> {
        if self.items.len() >= self.max_count {
            return Err(AtError::ResourceExhausted("parameters"));
        }
        if param.len() > self.max_length {
            return Err(AtError::ResourceExhausted("parameter length"));
        }
        self.items.push(param);
        Ok(())
    }

    /// Parameter at `index`.
    pub fn get(&self, index: usize) -> AtResult<&str> {
        self.items
            .get(index)
            .map(String::as_str)
            .ok_or(AtError::ParameterOutOfRange {
                index,
                count: self.items.len(),
            })
    }

    /// All parameters in capture order.
    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every parameter.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// FIFO of response texts waiting for delivery.
#[derive(Debug, Clone)]
pub struct ResponseQueue {
    items: VecDeque<String>,
    capacity: usize,
}

impl ResponseQueue {
    /// Create an empty queue holding at most `capacity` texts.
    pub fn new(capacity: usize) -> Self {
        ResponseQueue {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Queue a text at the back.
    pub fn push(&mut self, text: String) -> AtResult<()> {
        if self.items.len() >= self.capacity {
            return Err(AtError::ResourceExhausted("unsolicited queue"));
        }
        self.items.push_back(text);
        Ok(())
    }

    /// Take the oldest text.
    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Discard everything without delivering it.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
