use faid_primitives::outpoint::OutPoint;
use faid_primitives::transaction::{Transaction, TxIn, TxOut};
use faid_script::sigops::{legacy_sigop_count, p2sh_sigop_count};
use faid_script::standard::{p2pkh_script, p2sh_script};

fn redeem_2_of_3() -> Vec<u8> {
    let mut redeem = vec![0x52];
    for key in 0..3u8 {
        redeem.push(33);
        redeem.extend_from_slice(&[key + 2; 33]);
    }
    redeem.extend_from_slice(&[0x53, 0xae]);
    redeem
}

fn spend(script_sig: Vec<u8>) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::new([9u8; 32], 0, 1_000), script_sig)],
        vout: vec![TxOut::new(900, p2pkh_script(&[1u8; 20]))],
    }
}

#[test]
fn legacy_counts_outputs_and_inputs() {
    let tx = spend(vec![0xac]);
    assert_eq!(legacy_sigop_count(&tx), 2);
}

#[test]
fn p2sh_counts_redeem_script() {
    let redeem = redeem_2_of_3();
    let mut script_sig = vec![0x00, 0x01, 0x30];
    script_sig.push(0x4c);
    script_sig.push(redeem.len() as u8);
    script_sig.extend_from_slice(&redeem);
    let tx = spend(script_sig);

    let count = p2sh_sigop_count(&tx, |_| Some(p2sh_script(&[7u8; 20])));
    assert_eq!(count, 3);

    let non_p2sh = p2sh_sigop_count(&tx, |_| Some(p2pkh_script(&[7u8; 20])));
    assert_eq!(non_p2sh, 0);

    let unresolved = p2sh_sigop_count(&tx, |_| None);
    assert_eq!(unresolved, 0);
}

#[test]
fn coinbase_has_no_p2sh_sigops() {
    let coinbase = Transaction {
        version: 1,
        vin: vec![TxIn::new(OutPoint::coinbase_marker(3, 10), vec![0xae])],
        vout: vec![TxOut::new(10, Vec::new())],
    };
    assert_eq!(p2sh_sigop_count(&coinbase, |_| Some(p2sh_script(&[0; 20]))), 0);
}
