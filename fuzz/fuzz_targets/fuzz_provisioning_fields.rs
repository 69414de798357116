//! Fuzz target: `CredentialCapture::accept` (BLE write path)
//!
//! The first byte of each chunk selects the characteristic, the remaining
//! bytes are the written value.  Chunks are separated by `0xFF`.
//!
//! Invariants checked:
//! - No panics under any write sequence
//! - A rejected write never changes the number of captured fields
//! - Whatever `take()` hands out is a valid, persistable pair
//!
//! cargo fuzz run fuzz_provisioning_fields

#![no_main]

use libfuzzer_sys::fuzz_target;
use plantbot::app::credentials::Credentials;
use plantbot::app::ports::ProvisioningField;
use plantbot::app::provisioning::CredentialCapture;

fuzz_target!(|data: &[u8]| {
    let mut capture = CredentialCapture::new();

    for chunk in data.split(|b| *b == 0xFF) {
        let Some((&selector, value)) = chunk.split_first() else {
            continue;
        };
        let field = match selector % 3 {
            0 => ProvisioningField::NetworkId,
            1 => ProvisioningField::NetworkSecret,
            _ => ProvisioningField::SessionToken,
        };
        let before = capture.captured_fields();
        if capture.accept(field, value).is_err() {
            assert_eq!(capture.captured_fields(), before);
        }
    }

    let complete = capture.is_complete();
    match capture.take() {
        Some((creds, token)) => {
            assert!(complete);
            assert!(!token.as_str().is_empty());
            let record = creds.encode();
            assert_eq!(Credentials::decode(record.as_bytes()), Some(creds));
        }
        None => assert!(!complete),
    }
});
