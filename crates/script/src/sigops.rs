//! Signature-operation counting for block budgets.
//!
//! Legacy counting walks every script in a transaction and charges 20 for any
//! multisig. Pay-to-script-hash counting looks up the spent output, and for a
//! P2SH output counts the redeem script (last push of the script_sig)
//! accurately.

use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::Transaction;

use crate::opcodes::*;
use crate::standard::{is_p2sh, parse_push_only};

pub const MAX_PUBKEYS_PER_MULTISIG: u32 = 20;

/// Counts signature operations up to the first malformed push.
///
/// With `accurate`, a multisig preceded by `OP_n` is charged `n` instead of
/// the maximum.
pub fn count_sigops(script: &[u8], accurate: bool) -> u32 {
    let mut cursor = 0usize;
    let mut last_opcode = 0xffu8;
    let mut count = 0u32;
    while cursor < script.len() {
        let opcode = script[cursor];
        cursor += 1;
        let skip = match opcode {
            0x01..=0x4b => opcode as usize,
            OP_PUSHDATA1 => match script.get(cursor) {
                Some(len) => 1 + *len as usize,
                None => break,
            },
            OP_PUSHDATA2 => match script.get(cursor..cursor + 2) {
                Some(bytes) => 2 + u16::from_le_bytes([bytes[0], bytes[1]]) as usize,
                None => break,
            },
            OP_PUSHDATA4 => match script.get(cursor..cursor + 4) {
                Some(bytes) => {
                    4 + u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                }
                None => break,
            },
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                count = count.saturating_add(1);
                0
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let add = match decode_op_n(last_opcode) {
                    Some(n) if accurate && last_opcode != OP_0 => n as u32,
                    _ => MAX_PUBKEYS_PER_MULTISIG,
                };
                count = count.saturating_add(add);
                0
            }
            _ => 0,
        };
        match cursor.checked_add(skip) {
            Some(next) if next <= script.len() => cursor = next,
            _ => break,
        }
        last_opcode = opcode;
    }
    count
}

/// Legacy count over every input and output script.
pub fn legacy_sigop_count(tx: &Transaction) -> u32 {
    let inputs = tx
        .vin
        .iter()
        .map(|input| count_sigops(&input.script_sig, false));
    let outputs = tx
        .vout
        .iter()
        .map(|output| count_sigops(&output.script_pubkey, false));
    inputs.chain(outputs).fold(0u32, u32::saturating_add)
}

/// Redeem-script count for inputs spending P2SH outputs.
///
/// `spent_script` resolves the script_pubkey of the output an input spends;
/// inputs it cannot resolve count zero. Coinbase transactions count zero.
pub fn p2sh_sigop_count<F>(tx: &Transaction, mut spent_script: F) -> u32
where
    F: FnMut(&OutPoint) -> Option<Vec<u8>>,
{
    if tx.is_coinbase() {
        return 0;
    }
    let mut count = 0u32;
    for input in &tx.vin {
        let Some(script_pubkey) = spent_script(&input.prevout) else {
            continue;
        };
        if !is_p2sh(&script_pubkey) {
            continue;
        }
        let Some(redeem) = parse_push_only(&input.script_sig).and_then(|mut stack| stack.pop())
        else {
            continue;
        };
        count = count.saturating_add(count_sigops(&redeem, true));
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multisig_accurate_uses_key_count() {
        let script = [OP_1 + 1, OP_1 + 2, OP_CHECKMULTISIG];
        assert_eq!(count_sigops(&script, true), 3);
        assert_eq!(count_sigops(&script, false), 20);
    }

    #[test]
    fn truncated_push_stops_counting() {
        let script = [OP_CHECKSIG, 0x05, 0x01, OP_CHECKSIG];
        assert_eq!(count_sigops(&script, false), 1);
    }

    #[test]
    fn push_data_is_skipped() {
        let script = [OP_PUSHDATA1, 0x02, OP_CHECKSIG, OP_CHECKSIG, OP_CHECKSIGVERIFY];
        assert_eq!(count_sigops(&script, false), 1);
    }
}
