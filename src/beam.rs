use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::rules::NonTerminal;

/// A beam candidate. Higher merit ranks higher; ties go to the smaller non-terminal id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
  fom: f64,
  nt: NonTerminal,
}

impl Eq for Candidate {}

impl Ord for Candidate {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .fom
      .total_cmp(&other.fom)
      .then_with(|| other.nt.cmp(&self.nt))
  }
}

impl PartialOrd for Candidate {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Keeps the `capacity` best non-terminals of a cell by figure of merit.
///
/// Backed by a min-heap, so the worst kept candidate is always at the top and
/// is evicted when a better one arrives.
#[derive(Debug, Clone)]
pub struct BoundedPriorityQueue {
  heap: BinaryHeap<Reverse<Candidate>>,
  capacity: usize,
}

impl BoundedPriorityQueue {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0);
    Self {
      heap: BinaryHeap::with_capacity(capacity + 1),
      capacity,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Clears the queue and sets a new capacity
  pub fn reset(&mut self, capacity: usize) {
    assert!(capacity > 0);
    self.heap.clear();
    self.capacity = capacity;
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }

  pub fn is_at_capacity(&self) -> bool {
    self.heap.len() >= self.capacity
  }

  /// Offers a candidate, returning whether it was kept. NaN merits are never kept.
  pub fn push(&mut self, fom: f64, nt: NonTerminal) -> bool {
    if fom.is_nan() {
      return false;
    }
    let candidate = Candidate { fom, nt };
    if self.heap.len() < self.capacity {
      self.heap.push(Reverse(candidate));
      return true;
    }
    match self.heap.peek() {
      Some(Reverse(worst)) if candidate > *worst => {
        self.heap.pop();
        self.heap.push(Reverse(candidate));
        true
      }
      _ => false,
    }
  }

  /// Empties the queue into `out`, best first
  pub fn drain_sorted(&mut self, out: &mut Vec<(NonTerminal, f64)>) {
    out.clear();
    out.extend(self.heap.drain().map(|Reverse(c)| (c.nt, c.fom)));
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
  }
}

#[test]
fn test_bounded_priority_queue() {
  let mut q = BoundedPriorityQueue::new(3);
  assert!(q.is_empty());

  assert!(q.push(-1.0, 4));
  assert!(q.push(-3.0, 2));
  assert!(q.push(-2.0, 7));
  assert!(q.is_at_capacity());

  // worse than everything kept
  assert!(!q.push(-5.0, 1));
  // evicts -3.0
  assert!(q.push(-0.5, 9));
  assert!(!q.push(f64::NAN, 3));
  assert_eq!(q.len(), 3);

  let mut out = Vec::new();
  q.drain_sorted(&mut out);
  assert_eq!(out, vec![(9, -0.5), (4, -1.0), (7, -2.0)]);
  assert!(q.is_empty());
}

#[test]
fn test_ties_prefer_smaller_ids() {
  let mut q = BoundedPriorityQueue::new(2);
  q.push(0.0, 5);
  q.push(0.0, 3);
  q.push(0.0, 1);

  let mut out = Vec::new();
  q.drain_sorted(&mut out);
  assert_eq!(out, vec![(1, 0.0), (3, 0.0)]);

  q.reset(1);
  assert_eq!(q.capacity(), 1);
  assert!(q.is_empty());
}
