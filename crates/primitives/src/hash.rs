use faid_consensus::Hash256;
use ripemd::{Digest as RipemdDigest, Ripemd160};
use sha2::Sha256;

pub fn sha256(data: &[u8]) -> Hash256 {
    to_hash(&Sha256::digest(data))
}

pub fn sha256d(data: &[u8]) -> Hash256 {
    to_hash(&Sha256::digest(Sha256::digest(data)))
}

/// Double SHA-256 over the concatenation of `parts`, without an intermediate buffer.
pub fn sha256d_concat(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    to_hash(&Sha256::digest(hasher.finalize()))
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let digest = Ripemd160::digest(sha256(data));
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

fn to_hash(digest: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_matches_buffered() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);
        assert_eq!(sha256d_concat(&[&a, &b]), sha256d(&joined));
    }

    #[test]
    fn sha256d_empty_vector() {
        // Well-known double SHA-256 of the empty string.
        let digest = sha256d(&[]);
        assert_eq!(digest[0], 0x5d);
        assert_eq!(digest[31], 0x56);
    }
}
