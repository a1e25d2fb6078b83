#![no_main]

use libfuzzer_sys::fuzz_target;
use rumtk_hl7_v2::hl7_v2_parser::v2_parser::V2Message;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = V2Message::from_str(text);
});
