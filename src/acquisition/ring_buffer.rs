// src/acquisition/ring_buffer.rs
//! Fixed-capacity sample history, newest first

use std::collections::VecDeque;

/// Ring of the most recent `capacity` samples
///
/// Always full: it is seeded at construction and every push evicts the
/// oldest value. Index 0 is the newest sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRing {
    values: VecDeque<f64>,
    capacity: usize,
}

impl HistoryRing {
    /// Ring pre-filled so that the value of age `i` is `seed(i)`
    pub fn seeded(capacity: usize, seed: impl Fn(usize) -> f64) -> Self {
        Self {
            values: (0..capacity).map(seed).collect(),
            capacity,
        }
    }

    /// Ring seeded with `sin(i * step)`, giving the filter a finite,
    /// non-trivial history before live samples arrive
    pub fn with_sine_seed(capacity: usize, step: f64) -> Self {
        Self::seeded(capacity, |i| (i as f64 * step).sin())
    }

    pub fn filled(capacity: usize, value: f64) -> Self {
        Self {
            values: VecDeque::from(vec![value; capacity]),
            capacity,
        }
    }

    /// Insert the newest value, evicting the oldest
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.values.pop_back();
        self.values.push_front(value);
    }

    /// Value `age` samples old (0 = newest)
    pub fn get(&self, age: usize) -> Option<f64> {
        self.values.get(age).copied()
    }

    pub fn newest(&self) -> Option<f64> {
        self.values.front().copied()
    }

    /// Newest-first iteration
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest `n` values in chronological (oldest first) order
    pub fn recent_chronological(&self, n: usize) -> Vec<f64> {
        let n = n.min(self.values.len());
        self.values.iter().take(n).rev().copied().collect()
    }

    /// Copy of the whole history, newest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}
