#![forbid(unsafe_code)]

use lyra_abr::{AbrError, AbrOptions, BitratePolicy};
use rstest::rstest;

use crate::common::{LADDER, Xorshift64};

/// Random strictly ascending table of 2..12 entries.
fn random_table(rng: &mut Xorshift64) -> Vec<u32> {
    let len = rng.range_u64(2, 12);
    let mut next = rng.range_u64(64_000, 400_000);
    (0..len)
        .map(|_| {
            let entry = u32::try_from(next).unwrap();
            next += rng.range_u64(1, 2_000_000);
            entry
        })
        .collect()
}

fn policy_over(table: &[u32]) -> BitratePolicy {
    let mut policy = BitratePolicy::new(&AbrOptions::default());
    policy.set_bandwidth_range(table).unwrap();
    policy
}

#[rstest]
#[case(1)]
#[case(17)]
#[case(9_001)]
fn equal_bounds_collapse_to_closest_entry(#[case] seed: u64) {
    let mut rng = Xorshift64::new(seed);
    for _ in 0..200 {
        let table = random_table(&mut rng);
        let top = u64::from(*table.last().unwrap());
        let value = u32::try_from(rng.range_u64(0, top * 2)).unwrap();

        let mut policy = policy_over(&table);
        let expected = policy.find_closest_bitrate(value, true);
        policy.set_bandwidth_bounds(value, value).unwrap();

        assert_eq!(policy.bounds(), (expected, expected), "table {table:?}, value {value}");
        assert_eq!(policy.find_closest_bitrate(value, false), expected);
    }
}

#[rstest]
#[case(3)]
#[case(42)]
fn exact_matches_are_idempotent(#[case] seed: u64) {
    let mut rng = Xorshift64::new(seed);
    for _ in 0..200 {
        let table = random_table(&mut rng);
        let policy = policy_over(&table);
        for &entry in &table {
            assert_eq!(policy.find_closest_bitrate(entry, false), entry);
            assert_eq!(policy.find_closest_bitrate(entry, true), entry);
        }
    }
}

#[rstest]
#[case(5)]
#[case(77)]
fn neighbours_clamp_at_the_window_edges(#[case] seed: u64) {
    let mut rng = Xorshift64::new(seed);
    for _ in 0..200 {
        let table = random_table(&mut rng);
        let len = u64::try_from(table.len()).unwrap();
        let lo = usize::try_from(rng.range_u64(0, len - 1)).unwrap();
        let hi = usize::try_from(rng.range_u64(u64::try_from(lo).unwrap() + 1, len)).unwrap();

        let mut policy = policy_over(&table);
        policy.set_bandwidth_bounds(table[lo], table[hi]).unwrap();
        let (min, max) = policy.bounds();

        assert_eq!((min, max), (table[lo], table[hi]));
        assert_eq!(policy.find_next_lower_bitrate(min), min);
        assert_eq!(policy.find_next_higher_bitrate(max), max);
    }
}

#[test]
fn midpoint_resolves_to_the_lower_entry() {
    let policy = policy_over(&LADDER);
    assert_eq!(policy.find_closest_bitrate(750_000, false), 500_000);
    assert_eq!(policy.find_closest_bitrate(1_500_000, false), 1_000_000);
    assert_eq!(policy.find_closest_bitrate(750_001, false), 1_000_000);
}

#[rstest]
#[case::holds_below_padded_next(2_100_000.0, 1_000_000)]
#[case::upshifts_past_padding(2_800_000.0, 2_000_000)]
#[case::jumps_to_top(5_500_000.0, 4_000_000)]
#[case::floor(600_000.0, 500_000)]
fn decisions_from_one_megabit(#[case] measured: f64, #[case] expected: u32) {
    let mut policy = policy_over(&LADDER);
    policy.set_last_suggested(1_000_000);
    assert_eq!(policy.find_bitrate_to_switch_to(measured), expected);
}

#[test]
fn downshift_takes_an_extra_step() {
    let mut policy = policy_over(&LADDER);
    policy.set_last_suggested(4_000_000);
    // 3 Mbps still covers 2 Mbps padded (2.7 Mbps); one more step down.
    assert_eq!(policy.find_bitrate_to_switch_to(3_000_000.0), 1_000_000);
}

#[rstest]
#[case(2_000_000, 1_000_000)]
#[case(5_000_000, 6_000_000)]
fn bad_bounds_are_rejected(#[case] min: u32, #[case] max: u32) {
    let mut policy = policy_over(&LADDER);
    let err = policy.set_bandwidth_bounds(min, max).unwrap_err();
    assert!(matches!(
        err,
        AbrError::InvalidBounds { .. } | AbrError::EmptyBoundsWindow { .. }
    ));
    assert_eq!(policy.bounds(), (500_000, 4_000_000));
}
