//! String-reference locator
//!
//! Finds the instruction that loads the address of a known string constant.
//! The key routine logs `nt_sqlite3_key_v2: db=%p zDb=%s`, so the only
//! `lea rdx, [rip+disp32]` pointing at that string sits inside it:
//!
//! ```text
//! 00007FF999450A35 | 48:8D15 27535001 | lea rdx,qword ptr ds:[7FF99A955D63]
//! ```

/// `lea rdx, [rip+disp32]`
pub const LEA_RDX_RIP: [u8; 3] = [0x48, 0x8D, 0x15];

/// Opcode prefix + 32-bit displacement
pub const INSTRUCTION_LEN: usize = LEA_RDX_RIP.len() + 4;

/// Bytes of a section together with the address they were read from
#[derive(Debug, Clone, Copy)]
pub struct SectionBytes<'a> {
    pub start_address: u64,
    pub bytes: &'a [u8],
}

impl<'a> SectionBytes<'a> {
    pub fn new(start_address: u64, bytes: &'a [u8]) -> Self {
        Self {
            start_address,
            bytes,
        }
    }
}

/// Offset of the first occurrence of `needle`
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Address of `marker` inside `data`, if present.
pub fn find_marker(data: SectionBytes<'_>, marker: &[u8]) -> Option<u64> {
    find_bytes(data.bytes, marker).map(|offset| data.start_address + offset as u64)
}

/// Address of the first `lea rdx, [rip+disp32]` in `code` whose effective
/// address is `target`.
///
/// For an instruction at code offset `i` the displacement must be
/// `target - code_start - i - 7`.
pub fn find_lea_reference(code: SectionBytes<'_>, target: u64) -> Option<u64> {
    let target_offset = target as i64 - code.start_address as i64;

    code.bytes
        .windows(INSTRUCTION_LEN)
        .enumerate()
        .find(|(i, window)| {
            if window[..LEA_RDX_RIP.len()] != LEA_RDX_RIP {
                return false;
            }
            let expected = target_offset - *i as i64 - INSTRUCTION_LEN as i64;
            let Ok(expected) = i32::try_from(expected) else {
                return false;
            };
            window[LEA_RDX_RIP.len()..] == expected.to_le_bytes()
        })
        .map(|(i, _)| code.start_address + i as u64)
}

/// Locate the code that references `marker`: marker lookup in `data`, then
/// the instruction scan in `code`.
pub fn locate_reference(
    code: SectionBytes<'_>,
    data: SectionBytes<'_>,
    marker: &[u8],
) -> Option<u64> {
    let marker_address = find_marker(data, marker)?;
    log::debug!("Marker found at {:#x}", marker_address);
    find_lea_reference(code, marker_address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &[u8] = b"nt_sqlite3_key_v2: db=%p zDb=%s";

    fn lea(displacement: i32) -> Vec<u8> {
        let mut bytes = LEA_RDX_RIP.to_vec();
        bytes.extend_from_slice(&displacement.to_le_bytes());
        bytes
    }

    #[test]
    fn test_matches_shared_base() {
        let base = 0x7FF9_973E_1000u64;
        let (d, c) = (0x400usize, 0x120usize);

        let mut data = vec![0u8; 0x500];
        data[d..d + MARKER.len()].copy_from_slice(MARKER);
        let mut code = vec![0x90u8; 0x200];
        code[c..c + 7].copy_from_slice(&lea((d - c - 7) as i32));

        let found = locate_reference(
            SectionBytes::new(base, &code),
            SectionBytes::new(base, &data),
            MARKER,
        );
        assert_eq!(found, Some(base + c as u64));
    }

    #[test]
    fn test_matches_observed_layout() {
        // RVAs from a real wrapper.node build
        let base = 0x7FF9_973E_1000u64;
        let text_rva = 0x206_F000u64;
        let rdata_rva = 0x357_4000u64;
        let code_offset = 0xA35usize;
        let marker_offset = 0xD63usize;

        let mut code = vec![0xCCu8; 0x1000];
        code[code_offset..code_offset + 7]
            .copy_from_slice(&[0x48, 0x8D, 0x15, 0x27, 0x53, 0x50, 0x01]);
        let mut data = vec![0u8; 0x1000];
        data[marker_offset..marker_offset + MARKER.len()].copy_from_slice(MARKER);

        let found = locate_reference(
            SectionBytes::new(base + text_rva, &code),
            SectionBytes::new(base + rdata_rva, &data),
            MARKER,
        );
        assert_eq!(found, Some(base + 0x206_FA35));
    }

    #[test]
    fn test_ignores_wrong_displacement_and_prefix() {
        let base = 0x1_4000_0000u64;
        let mut data = vec![0u8; 0x100];
        data[0x80..0x80 + MARKER.len()].copy_from_slice(MARKER);

        let mut code = vec![0u8; 0x40];
        // off by one
        code[0x10..0x17].copy_from_slice(&lea((0x80 - 0x10 - 7 + 1) as i32));
        // lea rcx instead of rdx
        code[0x20..0x27].copy_from_slice(&[0x48, 0x8D, 0x0D, 0x59, 0, 0, 0]);

        let found = locate_reference(
            SectionBytes::new(base, &code),
            SectionBytes::new(base, &data),
            MARKER,
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_first_match_wins() {
        let base = 0x1000u64;
        let mut data = vec![0u8; 0x100];
        data[0xC0..0xC0 + MARKER.len()].copy_from_slice(MARKER);

        let mut code = vec![0u8; 0x60];
        code[0x08..0x0F].copy_from_slice(&lea((0xC0 - 0x08 - 7) as i32));
        code[0x30..0x37].copy_from_slice(&lea((0xC0 - 0x30 - 7) as i32));

        let found = find_lea_reference(SectionBytes::new(base, &code), base + 0xC0);
        assert_eq!(found, Some(base + 0x08));
    }

    #[test]
    fn test_missing_marker() {
        let code = lea(0);
        let data = b"something else entirely".to_vec();
        assert_eq!(
            locate_reference(
                SectionBytes::new(0, &code),
                SectionBytes::new(0, &data),
                MARKER
            ),
            None
        );
    }
}
