use faid_script::standard::{
    classify_script_pubkey, p2pkh_script, p2sh_script, parse_push_only, ScriptType,
};

#[test]
fn classify_p2pkh() {
    let script = p2pkh_script(&[0x11; 20]);
    assert_eq!(script.len(), 25);
    assert_eq!(classify_script_pubkey(&script), ScriptType::P2Pkh);
}

#[test]
fn classify_p2sh() {
    let mut script = vec![0xa9, 0x14];
    script.extend_from_slice(&[0x22; 20]);
    script.push(0x87);
    assert_eq!(script, p2sh_script(&[0x22; 20]));
    assert_eq!(classify_script_pubkey(&script), ScriptType::P2Sh);
}

#[test]
fn classify_p2pk() {
    let mut script = vec![33];
    script.extend_from_slice(&[0x02; 33]);
    script.push(0xac);
    assert_eq!(classify_script_pubkey(&script), ScriptType::P2Pk);
}

#[test]
fn classify_null_data_and_unknown() {
    assert_eq!(classify_script_pubkey(&[0x6a, 0x01, 0x01]), ScriptType::NullData);
    assert_eq!(classify_script_pubkey(&[0x51]), ScriptType::Unknown);
}

#[test]
fn push_only_parse() {
    let script = [0x02, 0xaa, 0xbb, 0x4c, 0x01, 0xcc, 0x00];
    let stack = parse_push_only(&script).expect("push only");
    assert_eq!(stack, vec![vec![0xaa, 0xbb], vec![0xcc], Vec::new()]);
    assert!(parse_push_only(&[0x02, 0xaa]).is_none());
    assert!(parse_push_only(&[0x76]).is_none());
}
