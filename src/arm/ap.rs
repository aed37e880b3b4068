//! MEM-AP (AHB access port) registers.

use bitfield::bitfield;

use super::Register;

/// An AP register additionally names the bank it lives in; the bank goes
/// into `SELECT.APBANKSEL` before the register can be addressed.
pub trait ApRegister: Register {
    /// Value for `SELECT.APBANKSEL`.
    const BANK: u8;
}

/// CSW address-increment modes.
pub const ADDR_INC_OFF: u8 = 0b00;
/// Increment TAR by the transfer size after each access.
pub const ADDR_INC_SINGLE: u8 = 0b01;

/// CSW transfer size encoding for 32-bit accesses.
pub const SIZE_32: u8 = 0b010;

/// MEM-AP auto-increment is only guaranteed within a 1 KiB window; TAR must
/// be rewritten when a block transfer crosses this boundary.
pub const AUTO_INCREMENT_BOUNDARY: u32 = 0x400;

bitfield! {
    /// Control and status word of the MEM-AP, bank 0 offset 0x0.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct Csw(u32);
    impl Debug;
    pub dbg_sw_enable, set_dbg_sw_enable: 31;
    pub u8, prot, set_prot: 30, 24;
    pub spiden, _: 23;
    pub tr_in_prog, _: 7;
    pub device_en, _: 6;
    pub u8, addr_inc, set_addr_inc: 5, 4;
    pub u8, size, set_size: 2, 0;
}

impl Csw {
    /// The configuration every memory access in this crate uses: 32-bit
    /// transfers, master-debug and hardware-protection bits raised.
    pub fn memory_access(addr_inc: u8) -> Self {
        let mut csw = Csw(0);
        csw.set_dbg_sw_enable(true);
        // HPROT1 (privileged data access), as the AHB-AP resets to on PSoC6.
        csw.set_prot(0b0100011);
        csw.set_addr_inc(addr_inc);
        csw.set_size(SIZE_32);
        csw
    }
}

impl From<u32> for Csw {
    fn from(raw: u32) -> Self {
        Csw(raw)
    }
}

impl From<Csw> for u32 {
    fn from(reg: Csw) -> Self {
        reg.0
    }
}

impl Register for Csw {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "CSW";
}

impl ApRegister for Csw {
    const BANK: u8 = 0x0;
}

bitfield! {
    /// Transfer address register, bank 0 offset 0x4.
    #[derive(Clone, Copy)]
    pub struct Tar(u32);
    impl Debug;
    pub u32, address, _: 31, 0;
}

impl From<u32> for Tar {
    fn from(raw: u32) -> Self {
        Tar(raw)
    }
}

impl From<Tar> for u32 {
    fn from(reg: Tar) -> Self {
        reg.0
    }
}

impl Register for Tar {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "TAR";
}

impl ApRegister for Tar {
    const BANK: u8 = 0x0;
}

bitfield! {
    /// Data read/write register, bank 0 offset 0xC; accessing it moves data
    /// at the address held in TAR.
    #[derive(Clone, Copy)]
    pub struct Drw(u32);
    impl Debug;
    pub u32, value, _: 31, 0;
}

impl From<u32> for Drw {
    fn from(raw: u32) -> Self {
        Drw(raw)
    }
}

impl From<Drw> for u32 {
    fn from(reg: Drw) -> Self {
        reg.0
    }
}

impl Register for Drw {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "DRW";
}

impl ApRegister for Drw {
    const BANK: u8 = 0x0;
}

bitfield! {
    /// Identification register, bank 0xF offset 0xC.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Idr(u32);
    impl Debug;
    pub u8, revision, _: 31, 28;
    pub u16, designer, _: 27, 17;
    pub u8, class, _: 16, 13;
    pub u8, variant, _: 7, 4;
    pub u8, ap_type, _: 3, 0;
}

/// IDR class value of a memory access port.
pub const AP_CLASS_MEM_AP: u8 = 0x8;
/// IDR type value of an AHB-AP.
pub const AP_TYPE_AHB: u8 = 0x1;

impl Idr {
    /// Whether this AP identifies as an AHB memory access port, the class
    /// the PSoC6 exposes for both cores.
    pub fn is_ahb_mem_ap(&self) -> bool {
        self.class() == AP_CLASS_MEM_AP && self.ap_type() == AP_TYPE_AHB
    }
}

impl From<u32> for Idr {
    fn from(raw: u32) -> Self {
        Idr(raw)
    }
}

impl From<Idr> for u32 {
    fn from(reg: Idr) -> Self {
        reg.0
    }
}

impl Register for Idr {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "IDR";
}

impl ApRegister for Idr {
    const BANK: u8 = 0xF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csw_memory_access_layout() {
        let value: u32 = Csw::memory_access(ADDR_INC_SINGLE).into();
        assert_eq!(value & 0b111, u32::from(SIZE_32));
        assert_eq!((value >> 4) & 0b11, u32::from(ADDR_INC_SINGLE));
        assert_ne!(value & (1 << 31), 0);
    }

    #[test]
    fn idr_recognises_the_psoc6_ahb_ap() {
        // Class 0x8 (MEM-AP), type 0x1 (AHB), ARM designer.
        let idr = Idr::from((0x23B << 17) | (0x8 << 13) | 0x1);
        assert_eq!(idr.class(), 0x8);
        assert_eq!(idr.ap_type(), 0x1);
        assert!(idr.is_ahb_mem_ap());
        assert!(!Idr::from(0).is_ahb_mem_ap());
    }
}
