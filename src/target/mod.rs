//! Target device descriptions: the PSoC6 memory map and per-family
//! programming constants.

pub mod memory_map;

pub use memory_map::{MemoryRegion, RegionTag, PSOC6_MEMORY_MAP};

/// Programming constants of one device family.
///
/// Every address the programmer touches outside of the firmware image itself
/// comes from this table: the test-mode register used during acquire, and the
/// SRAM/IPC addresses of the SROM system-call interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFamily {
    /// Family id as reported by the SiliconId SROM call.
    pub family_id: u16,
    /// Marketing name of the family.
    pub name: &'static str,
    /// Base address of the application flash.
    pub flash_base: u32,
    /// Size of the application flash in bytes.
    pub flash_size: u32,
    /// Smallest programmable flash unit.
    pub row_size: u32,
    /// Smallest erasable flash unit.
    pub sector_size: u32,
    /// SRSS test-mode register; bit 31 latches test mode.
    pub test_mode_reg: u32,
    /// SRAM address of the SROM parameter block.
    pub srom_params_addr: u32,
    /// SRAM address of the row scratch buffer.
    pub srom_data_addr: u32,
    /// IPC notify register that raises the SROM system-call interrupt.
    pub srom_trigger_reg: u32,
}

/// The families this crate knows how to program.
pub static FAMILIES: &[DeviceFamily] = &[DeviceFamily {
    family_id: 0x102,
    name: "PSoC6A-2M",
    flash_base: 0x1000_0000,
    flash_size: 0x0020_0000,
    row_size: 512,
    sector_size: 0x0004_0000,
    test_mode_reg: 0x4026_0100,
    srom_params_addr: 0x0800_0400,
    srom_data_addr: 0x0800_0600,
    srom_trigger_reg: 0x4023_0040,
}];

impl DeviceFamily {
    /// Look a family up by the id the silicon reports.
    pub fn from_family_id(family_id: u16) -> Option<&'static DeviceFamily> {
        FAMILIES.iter().find(|f| f.family_id == family_id)
    }

    /// The default family assumed before the silicon has been identified.
    pub fn default_family() -> &'static DeviceFamily {
        &FAMILIES[0]
    }

    /// End address (exclusive) of the application flash.
    pub fn flash_end(&self) -> u32 {
        self.flash_base + self.flash_size
    }
}

/// Lifecycle protection state reported by the SiliconId SROM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    /// Factory-fresh part, not yet provisioned.
    Virgin,
    /// Normal production state; flash fully accessible.
    Normal,
    /// Secured part; programming will be rejected by the silicon.
    Secure,
    /// Part transitioned to the terminal DEAD state.
    Dead,
    /// A value outside the documented lifecycle set.
    Unknown(u8),
}

impl From<u8> for ProtectionState {
    fn from(raw: u8) -> Self {
        match raw {
            0x01 => ProtectionState::Virgin,
            0x02 => ProtectionState::Normal,
            0x03 => ProtectionState::Secure,
            0x04 => ProtectionState::Dead,
            other => ProtectionState::Unknown(other),
        }
    }
}

/// Identification data read from an acquired target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Family id from the silicon.
    pub family_id: u16,
    /// Per-part silicon id.
    pub silicon_id: u16,
    /// Silicon revision.
    pub revision_id: u8,
    /// Lifecycle protection state.
    pub protection: ProtectionState,
}

impl DeviceInfo {
    /// Family name if the family id is known to this crate.
    pub fn family_name(&self) -> Option<&'static str> {
        DeviceFamily::from_family_id(self.family_id).map(|f| f.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_lookup_by_id() {
        assert_eq!(DeviceFamily::from_family_id(0x102).unwrap().name, "PSoC6A-2M");
        assert!(DeviceFamily::from_family_id(0xFFFF).is_none());
    }

    #[test]
    fn protection_state_decode() {
        assert_eq!(ProtectionState::from(0x01), ProtectionState::Virgin);
        assert_eq!(ProtectionState::from(0x02), ProtectionState::Normal);
        assert_eq!(ProtectionState::from(0x03), ProtectionState::Secure);
        assert_eq!(ProtectionState::from(0x04), ProtectionState::Dead);
        assert_eq!(ProtectionState::from(0x7A), ProtectionState::Unknown(0x7A));
    }
}
