use faid_pow::difficulty::{
    compact_to_target, compact_to_u256, hash_meets_target, target_to_compact, u256_to_compact,
    CompactError,
};

#[test]
fn compact_to_target_roundtrip() {
    for bits in [0x1d00ffff, 0x207fffff, 0x2000ffff, 0x1c05a3f4] {
        let target = compact_to_target(bits).expect("target");
        assert_eq!(target_to_compact(&target), bits, "bits {bits:#x}");
    }
}

#[test]
fn compact_target_layout() {
    let target = compact_to_target(0x207fffff).expect("target");
    assert!(target[..29].iter().all(|b| *b == 0));
    assert_eq!(target[29], 0xff);
    assert_eq!(target[30], 0xff);
    assert_eq!(target[31], 0x7f);
}

#[test]
fn compact_sign_and_overflow_rejected() {
    assert_eq!(compact_to_u256(0x04923456), Err(CompactError::Negative));
    assert_eq!(compact_to_u256(0xff123456), Err(CompactError::Overflow));
}

#[test]
fn compact_normalizes_high_bit() {
    let value = compact_to_u256(0x01120000).expect("value");
    assert_eq!(value.low_u64(), 0x12);
    assert_eq!(u256_to_compact(value), 0x01120000);
    let value = compact_to_u256(0x02008000).expect("value");
    assert_eq!(value.low_u64(), 0x80);
    assert_eq!(u256_to_compact(value), 0x02008000);
}

#[test]
fn hash_meets_target_cmp() {
    let target = [0x10u8; 32];
    let smaller = [0x00u8; 32];
    let larger = [0xffu8; 32];
    assert!(hash_meets_target(&smaller, &target));
    assert!(hash_meets_target(&target, &target));
    assert!(!hash_meets_target(&larger, &target));
}
