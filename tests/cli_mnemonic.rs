use assert_cmd::Command;
use predicates::str::{contains, is_match};

fn bin() -> Command {
    Command::cargo_bin("esn_bip44").unwrap()
}

#[test]
fn default_is_24_words() {
    bin()
        .arg("mnemonic")
        .assert()
        .success()
        .stdout(is_match(r"^[a-z]+( [a-z]+){23}\n$").unwrap());
}

#[test]
fn twelve_words_json() {
    let out = bin()
        .args(["--json", "mnemonic", "--words", "12"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["wordCount"], 12);
    let phrase = v["mnemonic"].as_str().unwrap();
    assert_eq!(phrase.split(' ').count(), 12);
    assert!(esn_bip44::is_valid_mnemonic(phrase));
}

#[test]
fn unsupported_word_counts_fail() {
    for wc in ["13", "0", "-1"] {
        bin()
            .args(["mnemonic", "--words", wc])
            .assert()
            .failure()
            .stderr(contains("E_WORD_COUNT"));
    }
}
