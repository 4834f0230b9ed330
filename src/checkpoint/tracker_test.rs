use std::sync::Arc;

use anyhow::{Context, Result};
use proptest::prelude::*;

use crate::checkpoint::CheckpointTracker;
use crate::error::CoordinatorError;
use crate::models::SourcePartition;

fn sp(partition: i32) -> SourcePartition {
    SourcePartition::new("topic", partition)
}

#[test]
fn out_of_order_acks_promote_only_contiguous_prefix() -> Result<()> {
    let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
    let mut observed = vec![];

    tracker.register(&sp, 1)?;
    observed.push(tracker.ack_checkpoint(&sp));
    tracker.register(&sp, 2)?;
    observed.push(tracker.ack_checkpoint(&sp));
    tracker.register(&sp, 3)?;
    observed.push(tracker.ack_checkpoint(&sp));
    tracker.ack(&sp, 2);
    observed.push(tracker.ack_checkpoint(&sp));
    tracker.ack(&sp, 3);
    observed.push(tracker.ack_checkpoint(&sp));
    tracker.ack(&sp, 1);
    observed.push(tracker.ack_checkpoint(&sp));

    assert_eq!(observed, vec![None, None, None, None, None, Some(3)], "unexpected ack checkpoint progression");
    assert_eq!(tracker.in_flight_count(&sp), 0, "expected no checkpoints in flight");
    assert_eq!(tracker.acked_past_checkpoint_count(&sp), 0, "expected all acks to be drained");

    Ok(())
}

#[test]
fn unacked_head_holds_back_checkpoint() -> Result<()> {
    let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));

    tracker.register(&sp, 1)?;
    tracker.register(&sp, 2)?;
    tracker.ack(&sp, 2);

    assert_eq!(tracker.ack_checkpoint(&sp), None, "expected no ack checkpoint while head is unacked");
    assert_eq!(tracker.in_flight_count(&sp), 2, "expected 2 in flight, got {}", tracker.in_flight_count(&sp));
    assert_eq!(
        tracker.acked_past_checkpoint_count(&sp),
        1,
        "expected 1 ack past checkpoint, got {}",
        tracker.acked_past_checkpoint_count(&sp)
    );

    Ok(())
}

#[test]
fn untracked_partition_reports_empty_state() -> Result<()> {
    let tracker = CheckpointTracker::<u64>::new();

    assert_eq!(tracker.ack_checkpoint(&sp(7)), None);
    assert_eq!(tracker.in_flight_count(&sp(7)), 0);
    assert_eq!(tracker.acked_past_checkpoint_count(&sp(7)), 0);
    assert!(!tracker.ack(&sp(7), 1), "expected ack on untracked partition to be ignored");

    Ok(())
}

#[test]
fn register_rejects_non_increasing_checkpoints() -> Result<()> {
    let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
    tracker.register(&sp, 5)?;

    let err = tracker.register(&sp, 5).err().context("expected duplicate registration to fail")?;
    assert!(matches!(err, CoordinatorError::OutOfOrderRegister { .. }), "unexpected error {:?}", err);
    let err = tracker.register(&sp, 4).err().context("expected lower registration to fail")?;
    assert!(matches!(err, CoordinatorError::OutOfOrderRegister { .. }), "unexpected error {:?}", err);
    assert_eq!(tracker.in_flight_count(&sp), 1, "expected rejected registrations to leave state untouched");

    // Ordering is still enforced after the in-flight queue fully drains.
    tracker.ack(&sp, 5);
    assert!(tracker.register(&sp, 5).is_err(), "expected registration at the current checkpoint to fail");
    tracker.register(&sp, 6)?;

    Ok(())
}

#[test]
fn register_is_independent_per_partition() -> Result<()> {
    let tracker = CheckpointTracker::<u64>::new();
    tracker.register(&sp(0), 10)?;
    tracker.register(&sp(1), 1)?;
    tracker.register(&SourcePartition::new("other", 0), 1)?;

    assert_eq!(tracker.in_flight_counts().len(), 3, "expected 3 tracked partitions");
    assert_eq!(tracker.total_in_flight(), 3, "expected 3 total in flight");

    Ok(())
}

#[test]
fn ack_of_unregistered_or_duplicate_checkpoint_is_ignored() -> Result<()> {
    let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
    tracker.register(&sp, 1)?;
    tracker.register(&sp, 3)?;

    assert!(!tracker.ack(&sp, 2), "expected ack of unregistered checkpoint to be ignored");
    assert!(tracker.ack(&sp, 3), "expected ack to be recorded");
    assert!(!tracker.ack(&sp, 3), "expected duplicate ack to be ignored");
    assert_eq!(tracker.acked_past_checkpoint_count(&sp), 1, "expected a single pending ack");

    Ok(())
}

#[test]
fn low_watermark_returns_default_when_nothing_in_flight() -> Result<()> {
    let tracker = CheckpointTracker::<u64>::new();
    assert_eq!(tracker.low_watermark(Some(42)), Some(42), "expected default with no statuses");

    tracker.register(&sp(0), 1)?;
    tracker.ack(&sp(0), 1);
    assert_eq!(tracker.low_watermark(Some(42)), Some(42), "expected default when all partitions are drained");
    assert_eq!(tracker.low_watermark(None), None, "expected empty default to pass through");

    Ok(())
}

#[test]
fn low_watermark_is_empty_when_any_active_partition_has_no_ack() -> Result<()> {
    let tracker = CheckpointTracker::<u64>::new();
    tracker.register(&sp(0), 1)?;
    tracker.register(&sp(0), 2)?;
    tracker.ack(&sp(0), 1);
    tracker.register(&sp(1), 3)?;

    assert_eq!(tracker.low_watermark(Some(0)), None, "expected no watermark while partition 1 has no ack");

    Ok(())
}

#[test]
fn low_watermark_is_min_over_active_partitions() -> Result<()> {
    let tracker = CheckpointTracker::<u64>::new();
    for c in [10, 20, 30] {
        tracker.register(&sp(0), c)?;
    }
    for c in [11, 21] {
        tracker.register(&sp(1), c)?;
    }
    // Partition 2 is fully drained and must not participate.
    tracker.register(&sp(2), 1)?;
    tracker.ack(&sp(2), 1);

    tracker.ack(&sp(0), 10);
    tracker.ack(&sp(0), 20);
    tracker.ack(&sp(1), 11);

    assert_eq!(tracker.low_watermark(None), Some(11), "expected min of 20 & 11");
    let reversed = tracker.low_watermark_by(None, |a: &u64, b: &u64| b.cmp(a));
    assert_eq!(reversed, Some(20), "expected comparator to drive selection");
    assert_eq!(tracker.latest_ack_checkpoint(), Some(20), "expected highest promoted checkpoint across partitions");

    Ok(())
}

#[test]
fn clear_drops_state_and_ignores_stale_acks() -> Result<()> {
    let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
    let stale = tracker.register(&sp, 1)?;
    tracker.clear_partition(&sp);
    assert_eq!(tracker.in_flight_count(&sp), 0, "expected partition state to be dropped");

    // A replay from an earlier position is allowed after a clear.
    let fresh = tracker.register(&sp, 1)?;
    assert!(!tracker.ack_registration(&stale, 1), "expected ack from the cleared generation to be ignored");
    assert_eq!(tracker.in_flight_count(&sp), 1, "expected the replayed checkpoint to remain in flight");
    assert!(tracker.ack_registration(&fresh, 1), "expected ack from the current generation to be recorded");
    assert_eq!(tracker.ack_checkpoint(&sp), Some(1));

    tracker.register(&sp, 2)?;
    tracker.clear();
    assert!(tracker.source_partitions().is_empty(), "expected all partitions to be dropped");

    Ok(())
}

#[test]
fn concurrent_acks_converge() -> Result<()> {
    let tracker = Arc::new(CheckpointTracker::<u64>::new());
    let partitions: Vec<_> = (0..4).map(sp).collect();
    for sp in partitions.iter() {
        for c in 0..500u64 {
            tracker.register(sp, c)?;
        }
    }

    let mut handles = vec![];
    for (idx, sp) in partitions.iter().cloned().enumerate() {
        for stripe in 0..2u64 {
            let tracker = tracker.clone();
            let sp = sp.clone();
            handles.push(std::thread::spawn(move || {
                // Walk the checkpoints backwards on odd stripes to force out of order acks.
                let iter: Box<dyn Iterator<Item = u64>> = if (idx as u64 + stripe) % 2 == 0 {
                    Box::new((0..500u64).filter(move |c| c % 2 == stripe))
                } else {
                    Box::new((0..500u64).rev().filter(move |c| c % 2 == stripe))
                };
                for c in iter {
                    tracker.ack(&sp, c);
                }
            }));
        }
    }
    for handle in handles {
        handle.join().map_err(|_| anyhow::anyhow!("ack thread panicked"))?;
    }

    for sp in partitions.iter() {
        assert_eq!(tracker.ack_checkpoint(sp), Some(499), "unexpected ack checkpoint on {}", sp);
        assert_eq!(tracker.in_flight_count(sp), 0, "unexpected in flight count on {}", sp);
        assert_eq!(tracker.acked_past_checkpoint_count(sp), 0, "unexpected pending acks on {}", sp);
    }
    assert_eq!(tracker.low_watermark(Some(1000)), Some(1000), "expected default once everything drained");

    Ok(())
}

/// Registered checkpoints along with a shuffled ack order covering a prefix of them.
fn registrations_with_prefix_acks() -> impl Strategy<Value = (Vec<u64>, usize, Vec<usize>)> {
    (1usize..60)
        .prop_flat_map(|n| (prop::collection::vec(1u64..1000, n), 0..=n))
        .prop_flat_map(|(gaps, k)| {
            let checkpoints: Vec<u64> = gaps
                .iter()
                .scan(0u64, |acc, gap| {
                    *acc += gap;
                    Some(*acc)
                })
                .collect();
            (Just(checkpoints), Just(k), Just((0..k).collect::<Vec<_>>()).prop_shuffle())
        })
}

proptest! {
    #[test]
    fn acks_covering_a_prefix_promote_the_whole_prefix((checkpoints, k, order) in registrations_with_prefix_acks()) {
        let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
        for c in checkpoints.iter() {
            prop_assert!(tracker.register(&sp, *c).is_ok());
        }
        for idx in order {
            tracker.ack(&sp, checkpoints[idx]);
        }

        let expected = if k == 0 { None } else { Some(checkpoints[k - 1]) };
        prop_assert_eq!(tracker.ack_checkpoint(&sp), expected);
        prop_assert_eq!(tracker.in_flight_count(&sp), checkpoints.len() - k);
        prop_assert_eq!(tracker.acked_past_checkpoint_count(&sp), 0);
    }

    #[test]
    fn ack_checkpoint_never_decreases(
        (checkpoints, order) in (1usize..60).prop_flat_map(|n| (Just((0..n as u64).map(|c| c * 3).collect::<Vec<_>>()), Just((0..n).collect::<Vec<_>>()).prop_shuffle())),
        acked_len in 0usize..60,
    ) {
        let (tracker, sp) = (CheckpointTracker::<u64>::new(), sp(0));
        for c in checkpoints.iter() {
            prop_assert!(tracker.register(&sp, *c).is_ok());
        }
        let mut last = tracker.ack_checkpoint(&sp);
        for idx in order.into_iter().take(acked_len) {
            tracker.ack(&sp, checkpoints[idx]);
            let observed = tracker.ack_checkpoint(&sp);
            prop_assert!(observed >= last, "ack checkpoint moved backwards from {:?} to {:?}", last, observed);
            last = observed;
        }
    }
}
