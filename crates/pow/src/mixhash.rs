//! Height-scaled memory-hardening mix applied to a header hash.
//!
//! The rolling value is xored with a fixed constant table and self-mixed for
//! `floor(16 * sqrt(height))` rounds, each intermediate value kept in a trail.
//! A second pass folds data-dependent trail entries back in. The result is
//! `sha256d(roller || input)`, both as 32 little-endian bytes.

use faid_consensus::Hash256;
use faid_primitives::hash::sha256d_concat;
use primitive_types::U256;

/// Mixing table; limbs are little-endian 64-bit words.
pub const MIX_CONSTANTS: [U256; 8] = [
    // 0x95faaa7b5ccde209b9cdebd1de254102795a295a883354449555f5a4e8f7493e
    U256([
        0x9555_f5a4_e8f7_493e,
        0x795a_295a_8833_5444,
        0xb9cd_ebd1_de25_4102,
        0x95fa_aa7b_5ccd_e209,
    ]),
    // 0xd89d9124591df8a0e45fe616535627a61302f599c882f4aa622c2a9223661937
    U256([
        0x622c_2a92_2366_1937,
        0x1302_f599_c882_f4aa,
        0xe45f_e616_5356_27a6,
        0xd89d_9124_591d_f8a0,
    ]),
    // 0xc9a7798889ffe05159c37b769a1b914ddd5e94610463d029acf288f37649c772
    U256([
        0xacf2_88f3_7649_c772,
        0xdd5e_9461_0463_d029,
        0x59c3_7b76_9a1b_914d,
        0xc9a7_7988_89ff_e051,
    ]),
    // 0x0c362798f117ebc70aff6afc7d49b3982132e3244702fc417b22fcfcbb0cd230
    U256([
        0x7b22_fcfc_bb0c_d230,
        0x2132_e324_4702_fc41,
        0x0aff_6afc_7d49_b398,
        0x0c36_2798_f117_ebc7,
    ]),
    // 0xf648c988f4f5e6e2f9d6b292a622c8cfe5016acd63dcafcf2f26002743b90d35
    U256([
        0x2f26_0027_43b9_0d35,
        0xe501_6acd_63dc_afcf,
        0xf9d6_b292_a622_c8cf,
        0xf648_c988_f4f5_e6e2,
    ]),
    // 0x059140f332690e0c6d37160d4444056a3f4135614bc93f2243f8c6118a69edd1
    U256([
        0x43f8_c611_8a69_edd1,
        0x3f41_3561_4bc9_3f22,
        0x6d37_160d_4444_056a,
        0x0591_40f3_3269_0e0c,
    ]),
    // 0x59b7c70950352b733d074b5bad162c9d3b732f1acbcf29e4b2c47eab5a5615c5
    U256([
        0xb2c4_7eab_5a56_15c5,
        0x3b73_2f1a_cbcf_29e4,
        0x3d07_4b5b_ad16_2c9d,
        0x59b7_c709_5035_2b73,
    ]),
    // 0x61dcfeae08c1d458ee5e6a65bb26c6419f64a15c169a94a9de34a11ab3753b39
    U256([
        0xde34_a11a_b375_3b39,
        0x9f64_a15c_169a_94a9,
        0xee5e_6a65_bb26_c641,
        0x61dc_feae_08c1_d458,
    ]),
];

/// `floor(16 * sqrt(height))`.
pub fn mix_rounds(height: u32) -> usize {
    (16.0 * f64::from(height).sqrt()) as usize
}

/// Adds the roller to its own rotation by its low byte.
fn mix_add(roller: &mut U256) {
    let shift = (roller.low_u64() & 0xff) as usize;
    let low = *roller >> shift;
    let high = if shift == 0 {
        U256::zero()
    } else {
        *roller << (256 - shift)
    };
    *roller = roller.overflowing_add(high | low).0;
}

pub fn mix_hash(input: &Hash256, height: u32) -> Hash256 {
    let rounds = mix_rounds(height);
    let mut roller = U256::from_little_endian(input);
    let mut trail = Vec::with_capacity(rounds);

    for i in 0..rounds {
        roller ^= MIX_CONSTANTS[i & 7];
        mix_add(&mut roller);
        trail.push(roller);
    }

    // Zero rounds leaves nothing to index; the feedback pass is skipped.
    for i in 0..rounds {
        let r = ((roller.low_u64() & 0xffff_ffff) as usize) % rounds;
        roller = roller.overflowing_add(trail[r]).0;
        roller ^= MIX_CONSTANTS[i & 7];
        mix_add(&mut roller);
    }

    let rolled: [u8; 32] = roller.to_little_endian();
    sha256d_concat(&[&rolled, input])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_table_hex() {
        let hex = "95faaa7b5ccde209b9cdebd1de254102795a295a883354449555f5a4e8f7493e";
        let parsed = U256::from_str_radix(hex, 16).expect("hex");
        assert_eq!(parsed, MIX_CONSTANTS[0]);
        let hex = "61dcfeae08c1d458ee5e6a65bb26c6419f64a15c169a94a9de34a11ab3753b39";
        let parsed = U256::from_str_radix(hex, 16).expect("hex");
        assert_eq!(parsed, MIX_CONSTANTS[7]);
    }

    #[test]
    fn mix_add_zero_shift_doubles() {
        let mut roller = U256::from(0x100u64);
        mix_add(&mut roller);
        assert_eq!(roller, U256::from(0x200u64));
    }

    #[test]
    fn mix_add_rotates_low_bits_high() {
        let mut roller = U256::from(0x01u64);
        mix_add(&mut roller);
        // shift 1: low part 0, high part 1 << 255
        assert_eq!(roller, (U256::one() << 255) + U256::one());
    }
}
