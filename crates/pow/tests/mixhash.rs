use faid_consensus::params::{consensus_params, Network};
use faid_primitives::block::BlockHeader;
use faid_primitives::hash::{sha256d, sha256d_concat};
use faid_pow::difficulty::target_to_compact;
use faid_pow::{check_proof_of_work, mix_hash, mix_rounds, pow_hash, PowError};

#[test]
fn rounds_scale_with_sqrt_height() {
    assert_eq!(mix_rounds(0), 0);
    assert_eq!(mix_rounds(1), 16);
    assert_eq!(mix_rounds(2), 22);
    assert_eq!(mix_rounds(100), 160);
    assert_eq!(mix_rounds(10_000), 1600);
}

#[test]
fn height_zero_is_plain_double_hash() {
    let input = sha256d(b"header");
    assert_eq!(mix_hash(&input, 0), sha256d_concat(&[&input, &input]));
}

fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[test]
fn mix_is_deterministic_and_height_sensitive() {
    let input = sha256d(b"candidate");
    for height in [1u32, 7, 100, 4_321] {
        assert_eq!(mix_hash(&input, height), mix_hash(&input, height));
    }
    assert_eq!(mix_rounds(110), 167);
    assert_ne!(mix_hash(&input, 100), mix_hash(&input, 110));
    assert_ne!(mix_hash(&input, 1), sha256d_concat(&[&input, &input]));
}

#[test]
fn heights_sharing_a_round_count_mix_alike() {
    let input = sha256d(b"candidate");
    assert_eq!(mix_rounds(100), mix_rounds(101));
    assert_eq!(mix_hash(&input, 100), mix_hash(&input, 101));
}

#[test]
fn mix_known_answers() {
    let input = sha256d(b"candidate");
    let vectors = [
        (1u32, "b4fc7c267033bdc65567a1d9810ae4b2387c42d884a60c4ab4dc0a84ca7a569b"),
        (100, "03482f5f3221566428b6717dfd4cbe832eddc66e5df2a8d30d41c81242029850"),
        (4_321, "20a2c6ab9473d1f45c800f74352ff8d145c4f28a9d36ed2a5f886018e80e0c92"),
    ];
    for (height, expected) in vectors {
        assert_eq!(to_hex(&mix_hash(&input, height)), expected, "height {height}");
    }
}

#[test]
fn mix_depends_on_input() {
    let a = sha256d(b"a");
    let b = sha256d(b"b");
    assert_ne!(mix_hash(&a, 50), mix_hash(&b, 50));
}

#[test]
fn proof_of_work_checks_limit_and_hash() {
    let params = consensus_params(Network::Regtest);
    let limit_bits = target_to_compact(&params.pow_limit);

    let mut header = BlockHeader {
        version: 1,
        bits: limit_bits,
        height: 9,
        ..BlockHeader::default()
    };
    // roughly half of all nonces satisfy the regtest limit
    let mut solved = false;
    for nonce in 0..64u64 {
        header.nonce = nonce;
        if check_proof_of_work(&header, &params).is_ok() {
            solved = true;
            break;
        }
        assert_eq!(
            check_proof_of_work(&header, &params),
            Err(PowError::HashAboveTarget)
        );
    }
    assert!(solved);
    assert_eq!(pow_hash(&header), mix_hash(&header.hash(), 9));

    header.bits = 0;
    assert!(matches!(
        check_proof_of_work(&header, &params),
        Err(PowError::InvalidBits(_))
    ));

    let main = consensus_params(Network::Mainnet);
    header.bits = limit_bits;
    assert!(matches!(
        check_proof_of_work(&header, &main),
        Err(PowError::InvalidBits(_))
    ));
}
