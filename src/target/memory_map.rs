//! The PSoC6 address-space map used to classify firmware segments.
//!
//! The upper `0x90xx_xxxx` rows are not real bus addresses: they are the
//! virtual regions Cypress HEX files use to carry checksum, protection,
//! metadata and eFuse payloads alongside the flash image.

/// Identity of a memory region as far as the firmware record is concerned.
///
/// The five supervisory-flash sub-regions all map to [`RegionTag::SFlash`];
/// everything else corresponds to exactly one table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTag {
    /// Main application flash.
    ApplicationFlash,
    /// ECC companion flash (not present on PSoC6; kept for the record model).
    EccFlash,
    /// Emulated EEPROM (work flash).
    Eeprom,
    /// Supervisory flash, aggregating its sub-regions.
    SFlash,
    /// External execute-in-place window.
    Xip,
    /// Nonvolatile user configuration (legacy families only).
    NVuser,
    /// Write-once nonvolatile latch (legacy families only).
    NVWO,
    /// HEX-virtual checksum row.
    Checksum,
    /// HEX-virtual flash protection bits.
    FlashProtection,
    /// HEX-virtual metadata row.
    MetaData,
    /// HEX-virtual chip protection byte.
    ChipProtection,
    /// eFuse data.
    EFuse,
}

/// One contiguous region of the target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Human-readable name, also used when re-serializing to HEX.
    pub name: &'static str,
    /// First address of the region.
    pub start: u32,
    /// Length in bytes.
    pub length: u32,
    /// The record bucket this region classifies into.
    pub tag: RegionTag,
}

impl MemoryRegion {
    /// Whether `addr` falls inside this region.
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && (addr - self.start) < self.length
    }

    /// End address (exclusive).
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// The PSoC6 region table. Regions do not overlap; order is ascending by
/// start address so the first match is the only match.
pub static PSOC6_MEMORY_MAP: &[MemoryRegion] = &[
    MemoryRegion {
        name: "ApplicationFlash",
        start: 0x1000_0000,
        length: 0x0020_0000,
        tag: RegionTag::ApplicationFlash,
    },
    MemoryRegion {
        name: "Eeprom",
        start: 0x1400_0000,
        length: 0x0000_8000,
        tag: RegionTag::Eeprom,
    },
    MemoryRegion {
        name: "SFlashUserData",
        start: 0x1600_0800,
        length: 0x0000_0800,
        tag: RegionTag::SFlash,
    },
    MemoryRegion {
        name: "SFlashNAR",
        start: 0x1600_1A00,
        length: 0x0000_0200,
        tag: RegionTag::SFlash,
    },
    MemoryRegion {
        name: "SFlashPublicKey",
        start: 0x1600_5A00,
        length: 0x0000_0C00,
        tag: RegionTag::SFlash,
    },
    MemoryRegion {
        name: "SFlashToc2",
        start: 0x1600_7C00,
        length: 0x0000_0200,
        tag: RegionTag::SFlash,
    },
    MemoryRegion {
        name: "SFlashRtoc2",
        start: 0x1600_7E00,
        length: 0x0000_0200,
        tag: RegionTag::SFlash,
    },
    MemoryRegion {
        name: "XIP",
        start: 0x1800_0000,
        length: 0x7800_0000,
        tag: RegionTag::Xip,
    },
    MemoryRegion {
        name: "Checksum",
        start: 0x9030_0000,
        length: 0x0000_0100,
        tag: RegionTag::Checksum,
    },
    MemoryRegion {
        name: "FlashProtection",
        start: 0x9040_0000,
        length: 0x0000_0400,
        tag: RegionTag::FlashProtection,
    },
    MemoryRegion {
        name: "MetaData",
        start: 0x9050_0000,
        length: 0x0000_0100,
        tag: RegionTag::MetaData,
    },
    MemoryRegion {
        name: "ChipProtection",
        start: 0x9060_0000,
        length: 0x0000_0100,
        tag: RegionTag::ChipProtection,
    },
    MemoryRegion {
        name: "eFuse",
        start: 0x9070_0000,
        length: 0x0000_1000,
        tag: RegionTag::EFuse,
    },
];

/// Find the region containing `addr`, if any. Segments starting outside
/// every region are dropped from the firmware record.
pub fn region_of(addr: u32) -> Option<&'static MemoryRegion> {
    PSOC6_MEMORY_MAP.iter().find(|region| region.contains(addr))
}
