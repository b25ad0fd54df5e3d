use kvcore::evict::{lfu, EvictionPool, EVPOOL_SIZE};
use proptest::prelude::*;
use rand::{rngs::SmallRng, SeedableRng};

proptest! {
    #[test]
    fn decay_never_increases_the_counter(
        counter in any::<u8>(),
        ldt in any::<u16>(),
        elapsed in 0u16..u16::MAX,
        more in 0u16..1000,
        decay_time in 0u32..60,
    ) {
        let field = lfu::pack(ldt, counter);
        let now = ldt.wrapping_add(elapsed);
        let decayed = lfu::decr_and_return(field, now, decay_time);
        prop_assert!(decayed <= counter);

        // Waiting longer never brings the counter back up, as long as the
        // minute clock wraps at most once.
        let later = now.wrapping_add(more.min(u16::MAX - elapsed));
        prop_assert!(lfu::decr_and_return(field, later, decay_time) <= decayed);
    }

    #[test]
    fn increment_is_monotonic_and_saturates(
        counter in any::<u8>(),
        log_factor in 0u32..100,
        seed in any::<u64>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let next = lfu::log_incr(counter, log_factor, &mut rng);
        prop_assert!(next >= counter);
        prop_assert!(next as u16 <= counter as u16 + 1);
        if counter == u8::MAX {
            prop_assert_eq!(next, u8::MAX);
        }
    }

    #[test]
    fn pool_keeps_the_highest_scores_in_order(scores in prop::collection::vec(any::<u64>(), 0..80)) {
        let mut pool = EvictionPool::new();
        for (i, score) in scores.iter().enumerate() {
            pool.insert(*score, format!("key:{}", i).as_bytes(), 0);
        }

        let mut expected = scores.clone();
        expected.sort_unstable();
        let expected: Vec<u64> = expected.into_iter().rev().take(EVPOOL_SIZE).rev().collect();
        let kept: Vec<u64> = pool.iter().map(|c| c.idle).collect();
        prop_assert_eq!(kept, expected);
    }
}

#[test]
fn increasing_scores_keep_the_last_sixteen() {
    let mut pool = EvictionPool::new();
    for score in 0..100u64 {
        pool.insert(score, &score.to_le_bytes(), 0);
    }
    let kept: Vec<u64> = pool.iter().map(|c| c.idle).collect();
    assert_eq!(kept, (84..100).collect::<Vec<_>>());
}
