//! Sequence number tracking of one subscription
//!
//! Notification messages are delivered strictly in sequence-number order.
//! Messages that arrive ahead of a gap are buffered until the missing ones
//! have been republished or given up on. Sequence numbers run from 1 to
//! `u32::MAX` and then wrap to 1.

use std::collections::{HashMap, HashSet};

/// Largest gap that is filled by republishing; anything wider is skipped
pub(crate) const MAX_SEQUENCE_GAP: u32 = 1024;

/// Sequence number following `n`
pub(crate) fn next_sequence(n: u32) -> u32 {
    if n == u32::MAX { 1 } else { n + 1 }
}

/// Steps from `from` forward to `to`
fn distance(from: u32, to: u32) -> u32 {
    if to >= from {
        to - from
    } else {
        (u32::MAX - from) + to
    }
}

fn is_behind(reference: u32, n: u32) -> bool {
    distance(reference, n) > u32::MAX / 2
}

/// Result of feeding the tracker
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Delivery<T> {
    /// Message ready for delivery
    Message(u32, T),
    /// `count` consecutive messages from `first` that could not be recovered
    Lost { first: u32, count: u32 },
}

#[derive(Debug)]
pub(crate) struct SequenceTracker<T> {
    /// Next sequence number to deliver
    expected: u32,
    /// One past the highest sequence number known to exist
    known_end: u32,
    buffered: HashMap<u32, T>,
    /// Republish in progress
    requested: HashSet<u32>,
    /// Given up on, skipped when reached
    lost: HashSet<u32>,
    acks: Vec<u32>,
    /// False until the first sequence number is seen
    anchored: bool,
}

impl<T> Default for SequenceTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SequenceTracker<T> {
    pub(crate) fn new() -> Self {
        Self {
            expected: 1,
            known_end: 1,
            buffered: HashMap::new(),
            requested: HashSet::new(),
            lost: HashSet::new(),
            acks: Vec::new(),
            anchored: true,
        }
    }

    /// Tracker of a subscription whose delivery history is unknown
    ///
    /// The first notification or keep-alive sets where delivery starts.
    pub(crate) fn unanchored() -> Self {
        Self {
            anchored: false,
            ..Self::new()
        }
    }

    fn anchor(&mut self, sequence_number: u32) {
        if !self.anchored {
            log::debug!("Sequence tracking starts at {}", sequence_number);
            self.expected = sequence_number;
            self.known_end = sequence_number;
            self.anchored = true;
        }
    }

    pub(crate) fn next_expected(&self) -> u32 {
        self.expected
    }

    /// Messages held back behind a gap
    pub(crate) fn buffered(&self) -> usize {
        self.buffered.len()
    }

    fn acknowledge(&mut self, sequence_number: u32) {
        if !self.acks.contains(&sequence_number) {
            self.acks.push(sequence_number);
        }
    }

    fn extend_known(&mut self, end: u32) {
        let ahead = distance(self.expected, end);
        if !is_behind(self.expected, end) && ahead > distance(self.expected, self.known_end) {
            self.known_end = end;
        }
    }

    fn drain(&mut self, out: &mut Vec<Delivery<T>>) {
        loop {
            if let Some(message) = self.buffered.remove(&self.expected) {
                out.push(Delivery::Message(self.expected, message));
            } else if self.lost.remove(&self.expected) {
                out.push(Delivery::Lost {
                    first: self.expected,
                    count: 1,
                });
            } else {
                break;
            }
            self.expected = next_sequence(self.expected);
        }
        if is_behind(self.expected, self.known_end) {
            self.known_end = self.expected;
        }
    }

    /// Give up on everything before `target`, delivering what is buffered
    fn skip_to(&mut self, target: u32, out: &mut Vec<Delivery<T>>) {
        log::warn!(
            "Sequence jumped from {} to {}, skipping the gap",
            self.expected,
            target
        );
        let expected = self.expected;
        let mut held: Vec<u32> = self
            .buffered
            .keys()
            .copied()
            .filter(|n| distance(expected, *n) < distance(expected, target))
            .collect();
        held.sort_by_key(|n| distance(expected, *n));
        let mut cursor = expected;
        for n in held {
            if n != cursor {
                out.push(Delivery::Lost {
                    first: cursor,
                    count: distance(cursor, n),
                });
            }
            if let Some(message) = self.buffered.remove(&n) {
                out.push(Delivery::Message(n, message));
            }
            cursor = next_sequence(n);
        }
        if cursor != target {
            out.push(Delivery::Lost {
                first: cursor,
                count: distance(cursor, target),
            });
        }
        self.requested.clear();
        self.lost.clear();
        self.expected = target;
        self.known_end = target;
    }

    /// A notification message with data arrived
    ///
    /// The sequence number is acknowledged even when it is a duplicate.
    pub(crate) fn on_notification(&mut self, sequence_number: u32, message: T) -> Vec<Delivery<T>> {
        self.acknowledge(sequence_number);
        self.anchor(sequence_number);
        if is_behind(self.expected, sequence_number) || self.buffered.contains_key(&sequence_number) {
            log::debug!("Dropping duplicate notification {}", sequence_number);
            return Vec::new();
        }
        self.requested.remove(&sequence_number);
        self.lost.remove(&sequence_number);
        let mut out = Vec::new();
        if distance(self.expected, sequence_number) > MAX_SEQUENCE_GAP {
            self.skip_to(sequence_number, &mut out);
        }
        self.extend_known(next_sequence(sequence_number));
        self.buffered.insert(sequence_number, message);
        self.drain(&mut out);
        out
    }

    /// A republished message arrived
    pub(crate) fn on_republished(&mut self, sequence_number: u32, message: T) -> Vec<Delivery<T>> {
        self.on_notification(sequence_number, message)
    }

    /// A keep-alive announced the next sequence number the server will use
    pub(crate) fn on_keep_alive(&mut self, next_sequence_number: u32) -> Vec<Delivery<T>> {
        self.anchor(next_sequence_number);
        let mut out = Vec::new();
        if is_behind(self.expected, next_sequence_number) {
            return out;
        }
        if distance(self.expected, next_sequence_number) > MAX_SEQUENCE_GAP {
            self.skip_to(next_sequence_number, &mut out);
        } else {
            self.extend_known(next_sequence_number);
        }
        out
    }

    /// A message could not be republished
    pub(crate) fn on_lost(&mut self, sequence_number: u32) -> Vec<Delivery<T>> {
        self.requested.remove(&sequence_number);
        let mut out = Vec::new();
        if is_behind(self.expected, sequence_number) || self.buffered.contains_key(&sequence_number) {
            return out;
        }
        self.lost.insert(sequence_number);
        self.drain(&mut out);
        out
    }

    /// Forget an outstanding request so the number is requested again
    pub(crate) fn retry_later(&mut self, sequence_number: u32) {
        self.requested.remove(&sequence_number);
    }

    /// Missing sequence numbers not yet requested, marked as requested
    pub(crate) fn take_missing(&mut self) -> Vec<u32> {
        let mut missing = Vec::new();
        let mut n = self.expected;
        let mut steps = 0;
        while n != self.known_end && steps < MAX_SEQUENCE_GAP {
            if !self.buffered.contains_key(&n) && !self.lost.contains(&n) && self.requested.insert(n) {
                missing.push(n);
            }
            n = next_sequence(n);
            steps += 1;
        }
        missing
    }

    /// Align with the sequence numbers a server still holds after a transfer
    ///
    /// Numbers already delivered are acknowledged; newer ones are returned
    /// for republishing. Without a delivery history every available number
    /// is acknowledged.
    pub(crate) fn reconcile(&mut self, available: &[u32]) -> Vec<u32> {
        if !self.anchored {
            for &n in available {
                self.acknowledge(n);
            }
            return Vec::new();
        }
        for &n in available {
            if is_behind(self.expected, n) {
                self.acknowledge(n);
            } else {
                self.extend_known(next_sequence(n));
            }
        }
        self.take_missing()
    }

    /// Acknowledgements to send with the next Publish
    pub(crate) fn take_acks(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.acks)
    }

    /// Put back acknowledgements whose Publish failed
    pub(crate) fn requeue_acks(&mut self, acks: Vec<u32>) {
        for n in acks {
            self.acknowledge(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivered(out: &[Delivery<&'static str>]) -> Vec<u32> {
        out.iter()
            .map(|d| match d {
                Delivery::Message(n, _) | Delivery::Lost { first: n, .. } => *n,
            })
            .collect()
    }

    #[test]
    fn test_in_order_delivery() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(delivered(&tracker.on_notification(1, "a")), vec![1]);
        assert_eq!(delivered(&tracker.on_notification(2, "b")), vec![2]);
        assert!(tracker.take_missing().is_empty());
        assert_eq!(tracker.take_acks(), vec![1, 2]);
        assert!(tracker.take_acks().is_empty());
    }

    #[test]
    fn test_gap_is_republished_and_reordered() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(delivered(&tracker.on_notification(1, "one")), vec![1]);
        assert!(tracker.on_notification(3, "three").is_empty());
        assert_eq!(tracker.take_missing(), vec![2]);
        // requested numbers are not requested twice
        assert!(tracker.take_missing().is_empty());
        let out = tracker.on_republished(2, "two");
        assert_eq!(
            out,
            vec![Delivery::Message(2, "two"), Delivery::Message(3, "three")]
        );
        assert_eq!(tracker.next_expected(), 4);
        assert_eq!(tracker.buffered(), 0);
    }

    #[test]
    fn test_duplicates_are_dropped_but_acknowledged() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        tracker.take_acks();
        assert!(tracker.on_notification(1, "a").is_empty());
        assert_eq!(tracker.take_acks(), vec![1]);
    }

    #[test]
    fn test_keep_alive_reveals_gap() {
        let mut tracker: SequenceTracker<&str> = SequenceTracker::new();
        tracker.on_notification(1, "a");
        assert!(tracker.on_keep_alive(2).is_empty());
        assert!(tracker.take_missing().is_empty());
        tracker.on_keep_alive(4);
        assert_eq!(tracker.take_missing(), vec![2, 3]);
        // keep-alives are not acknowledged
        assert_eq!(tracker.take_acks(), vec![1]);
    }

    #[test]
    fn test_lost_message_is_skipped() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        tracker.on_notification(3, "c");
        assert_eq!(tracker.take_missing(), vec![2]);
        let out = tracker.on_lost(2);
        assert_eq!(out, vec![Delivery::Lost { first: 2, count: 1 }, Delivery::Message(3, "c")]);
        assert_eq!(tracker.next_expected(), 4);
    }

    #[test]
    fn test_deferred_republish_is_requested_again() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        tracker.on_notification(3, "c");
        assert_eq!(tracker.take_missing(), vec![2]);
        tracker.retry_later(2);
        assert_eq!(tracker.take_missing(), vec![2]);
    }

    #[test]
    fn test_wrap_around() {
        let mut tracker = SequenceTracker::new();
        tracker.expected = u32::MAX;
        tracker.known_end = u32::MAX;
        assert_eq!(delivered(&tracker.on_notification(u32::MAX, "last")), vec![u32::MAX]);
        assert_eq!(tracker.next_expected(), 1);
        assert_eq!(delivered(&tracker.on_notification(1, "first")), vec![1]);
    }

    #[test]
    fn test_large_jump_is_skipped() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        let out = tracker.on_notification(5000, "far");
        assert_eq!(
            out,
            vec![Delivery::Lost { first: 2, count: 4998 }, Delivery::Message(5000, "far")]
        );
        assert!(tracker.take_missing().is_empty());
    }

    #[test]
    fn test_large_jump_reports_each_lost_run() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        tracker.on_notification(4, "d");
        let out = tracker.on_notification(3000, "far");
        assert_eq!(
            out,
            vec![
                Delivery::Lost { first: 2, count: 2 },
                Delivery::Message(4, "d"),
                Delivery::Lost { first: 5, count: 2995 },
                Delivery::Message(3000, "far"),
            ]
        );
        assert_eq!(tracker.next_expected(), 3001);
    }

    #[test]
    fn test_reconcile_after_transfer() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        tracker.on_notification(2, "b");
        tracker.take_acks();
        // the server still holds 2 (delivered, unacknowledged) and 3 (never received)
        assert_eq!(tracker.reconcile(&[2, 3]), vec![3]);
        assert_eq!(tracker.take_acks(), vec![2]);
        assert_eq!(delivered(&tracker.on_republished(3, "c")), vec![3]);
    }

    #[test]
    fn test_unanchored_tracker_starts_at_first_notification() {
        let mut tracker = SequenceTracker::unanchored();
        assert!(tracker.reconcile(&[6, 7]).is_empty());
        assert_eq!(tracker.take_acks(), vec![6, 7]);
        assert_eq!(delivered(&tracker.on_notification(8, "h")), vec![8]);
        assert!(tracker.take_missing().is_empty());
        assert_eq!(tracker.next_expected(), 9);
    }

    #[test]
    fn test_unanchored_tracker_follows_keep_alive() {
        let mut tracker: SequenceTracker<&str> = SequenceTracker::unanchored();
        assert!(tracker.on_keep_alive(40).is_empty());
        assert!(tracker.take_missing().is_empty());
        tracker.on_notification(42, "b");
        assert_eq!(tracker.take_missing(), vec![40, 41]);
    }

    #[test]
    fn test_requeued_acks_are_not_duplicated() {
        let mut tracker = SequenceTracker::new();
        tracker.on_notification(1, "a");
        let acks = tracker.take_acks();
        tracker.on_notification(2, "b");
        tracker.requeue_acks(acks);
        let mut acks = tracker.take_acks();
        acks.sort_unstable();
        assert_eq!(acks, vec![1, 2]);
    }
}
