//! Integration tests for the public scanning and classification API
//!
//! Run with: cargo test --test locator_test

use keyfinder::analysis::signature::{find_lea_reference, find_marker, LEA_RDX_RIP};
use keyfinder::analysis::{locate_reference, SectionBytes};
use keyfinder::app::{classify, Confidence, KeyCollector, DEFAULT_MARKER};

fn lea_to(displacement: i32) -> Vec<u8> {
    let mut bytes = LEA_RDX_RIP.to_vec();
    bytes.extend_from_slice(&displacement.to_le_bytes());
    bytes
}

#[test]
fn test_reference_resolves_to_base_plus_offset() {
    let base = 0x7FF9_973E_1000u64;
    let marker = DEFAULT_MARKER.as_bytes();

    for (d, c) in [(0x200usize, 0x10usize), (0x1F0, 0x1A0), (0x40, 0x0)] {
        let mut data = vec![0u8; 0x300];
        data[d..d + marker.len()].copy_from_slice(marker);
        let mut code = vec![0x90u8; 0x1C0];
        code[c..c + 7].copy_from_slice(&lea_to(d as i32 - c as i32 - 7));

        let found = locate_reference(
            SectionBytes::new(base, &code),
            SectionBytes::new(base, &data),
            marker,
        );
        assert_eq!(found, Some(base + c as u64), "D={:#x} C={:#x}", d, c);
    }
}

#[test]
fn test_backward_reference() {
    // data placed before code: negative displacement
    let data_start = 0x1_8000_0000u64;
    let code_start = 0x1_8000_4000u64;
    let mut data = vec![0u8; 0x100];
    data[0x20..0x24].copy_from_slice(b"main");
    let mut code = vec![0u8; 0x100];
    let displacement = (data_start + 0x20) as i64 - (code_start + 0x30 + 7) as i64;
    code[0x30..0x37].copy_from_slice(&lea_to(displacement as i32));

    let marker_address = find_marker(SectionBytes::new(data_start, &data), b"main").unwrap();
    assert_eq!(marker_address, data_start + 0x20);
    assert_eq!(
        find_lea_reference(SectionBytes::new(code_start, &code), marker_address),
        Some(code_start + 0x30)
    );
}

#[test]
fn test_classifier_scenarios() {
    assert_eq!(
        classify(b"ab12CD!@#$%^&*()").map(|key| key.confidence),
        Some(Confidence::High)
    );
    assert_eq!(
        classify(b"abcdEFGH12345678").map(|key| key.confidence),
        Some(Confidence::Low)
    );

    let mut collector = KeyCollector::new();
    assert_eq!(collector.record(b"ab\x01dEFGH12345678"), None);
    assert!(collector.is_empty());
}
