#![no_main]

use clientcert_lib::parse_dn;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(dn) = std::str::from_utf8(data) {
        for (key, value) in parse_dn(dn) {
            assert!(!key.is_empty(), "empty key from {:?}", dn);
            assert!(!value.is_empty(), "empty value from {:?}", dn);
        }
    }
});
