//! Property-based test generators using proptest.

use proptest::prelude::*;
use rowfile_driver::WriteMode;

/// Strategy for journal-style file names with the given extension.
pub fn file_name_strategy(extension: &'static str) -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}")
        .expect("Invalid regex")
        .prop_map(move |stem| format!("{stem}.{extension}"))
}

/// Strategy for write payloads, empty ones included.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for write modes, biased towards appends like a journal.
pub fn write_mode_strategy() -> impl Strategy<Value = WriteMode> {
    prop_oneof![
        4 => Just(WriteMode::Append),
        1 => Just(WriteMode::Overwrite),
    ]
}

/// Strategy for a sequence of writes.
pub fn write_ops_strategy(
    max_ops: usize,
    max_len: usize,
) -> impl Strategy<Value = Vec<(WriteMode, Vec<u8>)>> {
    prop::collection::vec((write_mode_strategy(), payload_strategy(max_len)), 1..=max_ops)
}

/// Applies `ops` to an in-memory model and returns the expected content.
#[must_use]
pub fn expected_content(ops: &[(WriteMode, Vec<u8>)]) -> Vec<u8> {
    let mut content = Vec::new();
    for (mode, data) in ops {
        if *mode == WriteMode::Overwrite {
            content.clear();
        }
        content.extend_from_slice(data);
    }
    content
}
