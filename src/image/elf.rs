//! ELF32 program-header loading.
//!
//! Only the program headers matter for flashing: every `PT_LOAD` entry
//! contributes its file bytes, zero-filled out to the in-memory size. Section
//! headers, symbols and relocations are ignored.

use object::elf::{FileHeader32, PT_LOAD};
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;

use super::{ParseError, Segment};

/// One program-header entry of an ELF32 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSegment {
    /// The `p_type` field; only `PT_LOAD` entries carry data.
    pub p_type: u32,
    /// Physical load address (`p_paddr`), where the bytes get programmed.
    pub load_addr: u32,
    /// Number of bytes backed by the file (`p_filesz`).
    pub file_size: u32,
    /// Segment payload, `p_memsz` bytes long for loadable entries with the
    /// tail beyond `file_size` zero-filled. Empty for non-loadable entries.
    pub data: Vec<u8>,
}

impl ProgramSegment {
    /// True for `PT_LOAD` entries that actually carry bytes.
    pub fn is_loadable(&self) -> bool {
        self.p_type == PT_LOAD && !self.data.is_empty()
    }
}

/// Parse all program-header entries of `elf_data`.
pub fn parse(elf_data: &[u8]) -> Result<Vec<ProgramSegment>, ParseError> {
    match object::FileKind::parse(elf_data) {
        Ok(object::FileKind::Elf32) => {}
        Ok(object::FileKind::Elf64) => return Err(ParseError::NotElf32),
        _ => return Err(ParseError::NotElf),
    }

    let header = FileHeader32::<Endianness>::parse(elf_data).map_err(|_| ParseError::Truncated)?;
    let endian = header.endian().map_err(|_| ParseError::Truncated)?;
    let program_headers = header
        .program_headers(endian, elf_data)
        .map_err(|_| ParseError::Truncated)?;

    let mut segments = Vec::with_capacity(program_headers.len());
    for entry in program_headers {
        let p_type = entry.p_type(endian);
        let load_addr = entry.p_paddr(endian);
        let file_size = entry.p_filesz(endian);
        let mem_size = entry.p_memsz(endian);

        let data = if p_type == PT_LOAD && mem_size > 0 {
            let file_bytes = entry
                .data(endian, elf_data)
                .map_err(|_| ParseError::Truncated)?;
            tracing::debug!(
                "Loadable segment: paddr {:#010x}, filesz {:#x}, memsz {:#x}",
                load_addr,
                file_size,
                mem_size
            );
            let mut data = vec![0u8; mem_size as usize];
            let copied = file_bytes.len().min(data.len());
            data[..copied].copy_from_slice(&file_bytes[..copied]);
            data
        } else {
            Vec::new()
        };

        segments.push(ProgramSegment {
            p_type,
            load_addr,
            file_size,
            data,
        });
    }

    Ok(segments)
}

/// Parse `elf_data` and keep only the loadable entries, as [`Segment`]s.
pub fn loadable_segments(elf_data: &[u8]) -> Result<Vec<Segment>, ParseError> {
    Ok(parse(elf_data)?
        .into_iter()
        .filter(ProgramSegment::is_loadable)
        .map(|s| Segment::new(s.load_addr, s.data))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a minimal little-endian ELF32 with the given program-header
    /// entries, each `(p_type, p_paddr, payload, p_memsz)`.
    pub(crate) fn build_elf32(entries: &[(u32, u32, &[u8], u32)]) -> Vec<u8> {
        const EHSIZE: u32 = 52;
        const PHENTSIZE: u32 = 32;

        let ph_count = entries.len() as u32;
        let data_start = EHSIZE + ph_count * PHENTSIZE;

        let mut elf = Vec::new();
        elf.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
        elf.push(1); // ELFCLASS32
        elf.push(1); // little endian
        elf.push(1); // EV_CURRENT
        elf.extend_from_slice(&[0; 9]); // padding
        elf.extend_from_slice(&2u16.to_le_bytes()); // e_type: ET_EXEC
        elf.extend_from_slice(&40u16.to_le_bytes()); // e_machine: EM_ARM
        elf.extend_from_slice(&1u32.to_le_bytes()); // e_version
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_entry
        elf.extend_from_slice(&EHSIZE.to_le_bytes()); // e_phoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        elf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        elf.extend_from_slice(&(EHSIZE as u16).to_le_bytes()); // e_ehsize
        elf.extend_from_slice(&(PHENTSIZE as u16).to_le_bytes()); // e_phentsize
        elf.extend_from_slice(&(ph_count as u16).to_le_bytes()); // e_phnum
        elf.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        elf.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        assert_eq!(elf.len(), EHSIZE as usize);

        let mut offset = data_start;
        for (p_type, p_paddr, payload, p_memsz) in entries {
            elf.extend_from_slice(&p_type.to_le_bytes());
            elf.extend_from_slice(&offset.to_le_bytes()); // p_offset
            elf.extend_from_slice(&p_paddr.to_le_bytes()); // p_vaddr
            elf.extend_from_slice(&p_paddr.to_le_bytes()); // p_paddr
            elf.extend_from_slice(&(payload.len() as u32).to_le_bytes()); // p_filesz
            elf.extend_from_slice(&p_memsz.to_le_bytes()); // p_memsz
            elf.extend_from_slice(&5u32.to_le_bytes()); // p_flags: R+X
            elf.extend_from_slice(&4u32.to_le_bytes()); // p_align
            offset += payload.len() as u32;
        }
        for (_, _, payload, _) in entries {
            elf.extend_from_slice(payload);
        }
        elf
    }

    #[test]
    fn load_segment_is_zero_filled_to_mem_size() {
        let elf = build_elf32(&[(PT_LOAD, 0x1000_0000, &[0xDE, 0xAD, 0xBE, 0xEF], 16)]);
        let segments = loadable_segments(&elf).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].first(), 0x1000_0000);
        assert_eq!(segments[0].last(), 0x1000_000F);
        assert_eq!(
            segments[0].bytes(),
            &[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn non_load_entries_carry_no_data() {
        const PT_NOTE: u32 = 4;
        let elf = build_elf32(&[
            (PT_NOTE, 0, &[1, 2, 3, 4], 4),
            (PT_LOAD, 0x1000_0000, &[0xAA], 1),
        ]);
        let all = parse(&elf).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].p_type, PT_NOTE);
        assert!(all[0].data.is_empty());
        assert!(!all[0].is_loadable());
        assert!(all[1].is_loadable());

        let loadable = loadable_segments(&elf).unwrap();
        assert_eq!(loadable.len(), 1);
        assert_eq!(loadable[0].bytes(), &[0xAA]);
    }

    #[test]
    fn non_elf_input_is_rejected() {
        assert!(matches!(parse(b"not an elf"), Err(ParseError::NotElf)));
        assert!(matches!(parse(b":020000041000EA"), Err(ParseError::NotElf)));
    }

    #[test]
    fn elf64_is_rejected_as_not_elf32() {
        let mut elf = vec![0x7F, b'E', b'L', b'F', 2, 1, 1];
        elf.extend_from_slice(&[0; 57]);
        assert!(matches!(parse(&elf), Err(ParseError::NotElf32)));
    }

    #[test]
    fn truncated_program_header_table_is_detected() {
        let full = build_elf32(&[(PT_LOAD, 0x1000_0000, &[0xAA; 8], 8)]);
        // Cut inside the program-header table.
        let cut = &full[..56];
        assert!(matches!(parse(cut), Err(ParseError::Truncated)));
    }
}
