//! Fuzz target: `Credentials::decode` (persisted record path)
//!
//! Feeds arbitrary bytes as a stored credential record.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A decoded pair always re-validates and re-encodes within `RECORD_MAX`
//! - Decoding the re-encoded record yields the same pair
//!
//! cargo fuzz run fuzz_credential_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use plantbot::app::credentials::{Credentials, RECORD_MAX};

fuzz_target!(|data: &[u8]| {
    let Some(creds) = Credentials::decode(data) else {
        return;
    };

    assert!(!creds.network_id().is_empty());
    assert!(Credentials::new(creds.network_id(), creds.network_secret()).is_ok());

    let record = creds.encode();
    assert!(record.len() <= RECORD_MAX);
    assert_eq!(Credentials::decode(record.as_bytes()), Some(creds));
});
