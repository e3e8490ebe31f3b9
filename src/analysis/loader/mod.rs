//! Section table of a mapped PE image
//!
//! Parses the headers at a module's base address using goblin. Only the
//! first page is needed: DOS header, PE signature, COFF header and the
//! section table that follows the optional header.

use goblin::pe::header::Header;

use crate::debug::types::SectionInfo;

/// Bytes read from the module base; covers the headers of any normal image.
pub const HEADER_READ_SIZE: usize = 0x1000;

const SIZEOF_PE_MAGIC: usize = 4;
const SIZEOF_COFF_HEADER: usize = 20;

/// Parse the section table from header bytes copied out of the target.
///
/// `module_base` is added to each section's RVA to give its mapped address.
/// Returns `None` if the bytes are not a PE header.
pub fn parse_sections(header: &[u8], module_base: u64) -> Option<Vec<SectionInfo>> {
    let parsed = match Header::parse(header) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::debug!("Not a PE header at {:#x}: {}", module_base, e);
            return None;
        }
    };

    let mut offset = parsed.dos_header.pe_pointer as usize
        + SIZEOF_PE_MAGIC
        + SIZEOF_COFF_HEADER
        + parsed.coff_header.size_of_optional_header as usize;

    let table = match parsed.coff_header.sections(header, &mut offset) {
        Ok(table) => table,
        Err(e) => {
            log::debug!("Bad section table at {:#x}: {}", module_base, e);
            return None;
        }
    };

    let sections = table
        .iter()
        .map(|section| SectionInfo {
            name: String::from_utf8_lossy(&section.name)
                .trim_end_matches('\0')
                .to_string(),
            virtual_address: section.virtual_address,
            virtual_size: section.virtual_size,
            start_address: module_base + section.virtual_address as u64,
        })
        .collect();

    Some(sections)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal PE32+ header with the given `(name, rva, size)` sections and
    /// no optional header.
    pub(crate) fn build_header(sections: &[(&str, u32, u32)]) -> Vec<u8> {
        let pe_pointer = 0x80usize;
        let mut image = vec![0u8; HEADER_READ_SIZE];
        image[0..2].copy_from_slice(b"MZ");
        image[0x3C..0x40].copy_from_slice(&(pe_pointer as u32).to_le_bytes());
        image[pe_pointer..pe_pointer + 4].copy_from_slice(b"PE\0\0");

        let coff = pe_pointer + 4;
        image[coff..coff + 2].copy_from_slice(&0x8664u16.to_le_bytes());
        image[coff + 2..coff + 4].copy_from_slice(&(sections.len() as u16).to_le_bytes());
        image[coff + 18..coff + 20].copy_from_slice(&0x0022u16.to_le_bytes());

        let mut entry = coff + SIZEOF_COFF_HEADER;
        for (name, rva, size) in sections {
            let bytes = name.as_bytes();
            image[entry..entry + bytes.len()].copy_from_slice(bytes);
            image[entry + 8..entry + 12].copy_from_slice(&size.to_le_bytes());
            image[entry + 12..entry + 16].copy_from_slice(&rva.to_le_bytes());
            entry += 40;
        }
        image
    }

    #[test]
    fn test_parse_sections() {
        let header = build_header(&[(".text", 0x1000, 0x2000), (".rdata", 0x3000, 0x800)]);
        let sections = parse_sections(&header, 0x7FF9_0000_0000).unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, ".text");
        assert_eq!(sections[0].start_address, 0x7FF9_0000_1000);
        assert_eq!(sections[1].name, ".rdata");
        assert_eq!(sections[1].virtual_size, 0x800);
        assert_eq!(sections[1].virtual_address, 0x3000);
    }

    #[test]
    fn test_rejects_non_pe() {
        let mut header = build_header(&[(".text", 0x1000, 0x2000)]);
        header[0x80..0x84].copy_from_slice(b"XX\0\0");
        assert!(parse_sections(&header, 0x1000_0000).is_none());
        assert!(parse_sections(&[0u8; 64], 0x1000_0000).is_none());
    }
}
