#![no_main]
use libfuzzer_sys::fuzz_target;
use rails_marshal_session::Document;

// No input should ever panic the parser, regardless of how malformed it is;
// every failure mode is a returned ReaderError (§7: "the Reader does not
// throw, panic, or log; it only reports").
fuzz_target!(|data: &[u8]| {
    let _ = Document::parse(data);
});
