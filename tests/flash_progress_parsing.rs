use flashbridge::flash::parse_progress;

#[test]
fn writing_line_yields_percent() {
    assert_eq!(parse_progress("Writing at 0x00010000... (17 %)"), Some(17));
    assert_eq!(parse_progress("Writing at 0x0003a000... (100 %)"), Some(100));
}

#[test]
fn compact_percent_token_parses() {
    assert_eq!(parse_progress("Writing at 0x00008000... (3%)"), Some(3));
}

#[test]
fn non_matching_lines_yield_nothing() {
    assert_eq!(parse_progress("Hash of data verified."), None);
    assert_eq!(parse_progress("Connecting........__"), None);
    assert_eq!(parse_progress("Writing at 0x00010000..."), None);
    assert_eq!(parse_progress("Compressed 571392 bytes to 330753... (17 %)"), None);
    assert_eq!(parse_progress(""), None);
}

#[test]
fn garbage_tokens_are_ignored() {
    assert_eq!(parse_progress("Writing at 0x00010000... (banana %)"), None);
    assert_eq!(parse_progress("Writing at 0x00010000... (250 %)"), None);
}
