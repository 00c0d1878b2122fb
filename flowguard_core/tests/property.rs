use flowguard_core::flow_tracker::{FLOW_QUEUE_CAPACITY, FlowDeficitTracker};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Expected { mm: f32, dt: u32 },
    Actual { mm: f32 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0f32..20.0, 0u32..800).prop_map(|(mm, dt)| Op::Expected { mm, dt }),
        (0.0f32..20.0).prop_map(|mm| Op::Actual { mm }),
    ]
}

proptest! {
    #[test]
    fn outstanding_never_negative_and_matches_chunks(
        ops in prop::collection::vec(op_strategy(), 1..200),
        window in prop_oneof![Just(0u32), 500u32..5000],
        start in any::<u32>(),
    ) {
        let mut t = FlowDeficitTracker::new();
        let mut now = start;
        for op in ops {
            match op {
                Op::Expected { mm, dt } => {
                    now = now.wrapping_add(dt);
                    t.add_expected(mm, now, window);
                }
                Op::Actual { mm } => t.add_actual(mm),
            }
            let out = t.outstanding(now, window);
            prop_assert!(out >= 0.0);
            prop_assert!(t.len() <= FLOW_QUEUE_CAPACITY);
            let sum: f32 = t.chunks().map(|c| c.remaining_mm).sum();
            prop_assert!((sum - out).abs() < 1e-2, "sum {} vs outstanding {}", sum, out);
        }
        t.reset();
        prop_assert_eq!(t.outstanding(now, window), 0.0);
        prop_assert!(t.is_empty());
    }

    #[test]
    fn actual_drains_oldest_first(
        amounts in prop::collection::vec(0.5f32..10.0, 2..10),
        drain in 0.0f32..50.0,
    ) {
        let mut t = FlowDeficitTracker::new();
        for (i, mm) in amounts.iter().enumerate() {
            t.add_expected(*mm, i as u32, 0);
        }
        t.add_actual(drain);

        // every surviving chunk after the first is untouched
        let survivors: Vec<_> = t.chunks().copied().collect();
        let skipped = amounts.len() - survivors.len();
        for (k, chunk) in survivors.iter().enumerate().skip(1) {
            prop_assert_eq!(chunk.remaining_mm, amounts[skipped + k]);
            prop_assert_eq!(chunk.timestamp_ms, (skipped + k) as u32);
        }
        if let Some(front) = survivors.first() {
            prop_assert_eq!(front.timestamp_ms, skipped as u32);
            prop_assert!(front.remaining_mm <= amounts[skipped] + 1e-4);
        }
    }

    #[test]
    fn hold_requires_continuous_excess(
        samples in prop::collection::vec((any::<bool>(), 1u32..400), 1..60),
        hold in 1u32..2000,
    ) {
        let mut t = FlowDeficitTracker::new();
        let threshold = 5.0;
        let mut now = 0u32;
        let mut streak_start: Option<u32> = None;
        for (above, dt) in samples {
            now += dt;
            let value = if above { 10.0 } else { 1.0 };
            if above {
                streak_start.get_or_insert(now);
            } else {
                streak_start = None;
            }
            let expected = streak_start.is_some_and(|s| now - s >= hold);
            prop_assert_eq!(t.deficit_satisfied(value, now, threshold, hold), expected);
        }
    }
}

#[test]
fn disabled_hold_resets_latch() {
    let mut t = FlowDeficitTracker::new();
    assert!(!t.deficit_satisfied(10.0, 0, 5.0, 100));
    assert!(t.deficit_satisfied(10.0, 200, 5.0, 100));
    assert!(!t.deficit_satisfied(10.0, 300, 5.0, 0));
    // latch was cleared, so the hold starts over
    assert!(!t.deficit_satisfied(10.0, 350, 5.0, 100));
    assert!(t.deficit_satisfied(10.0, 450, 5.0, 100));
}
