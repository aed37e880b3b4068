//! SWD debug-port (DP) registers.

use bitfield::bitfield;

use super::Register;

bitfield! {
    /// Identification register, read at DP address 0x0.
    #[derive(Clone, Copy)]
    pub struct DPIDR(u32);
    impl Debug;
    pub u8, revision, _: 31, 28;
    pub u8, part_no, _: 27, 20;
    pub min, _: 16;
    pub u8, version, _: 15, 12;
    pub u16, designer, _: 11, 1;
}

impl From<u32> for DPIDR {
    fn from(raw: u32) -> Self {
        DPIDR(raw)
    }
}

impl From<DPIDR> for u32 {
    fn from(reg: DPIDR) -> Self {
        reg.0
    }
}

impl Register for DPIDR {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "DPIDR";
}

bitfield! {
    /// Abort register, written at DP address 0x0 to clear sticky flags or
    /// abort a hung AP transaction.
    #[derive(Clone, Copy, Default)]
    pub struct Abort(u32);
    impl Debug;
    pub _, set_orunerrclr: 4;
    pub _, set_wderrclr: 3;
    pub _, set_stkerrclr: 2;
    pub _, set_stkcmpclr: 1;
    pub _, set_dapabort: 0;
}

impl Abort {
    /// An abort value that clears every sticky flag at once.
    pub fn clear_all_sticky() -> Self {
        let mut abort = Abort(0);
        abort.set_orunerrclr(true);
        abort.set_wderrclr(true);
        abort.set_stkerrclr(true);
        abort.set_stkcmpclr(true);
        abort
    }
}

impl From<u32> for Abort {
    fn from(raw: u32) -> Self {
        Abort(raw)
    }
}

impl From<Abort> for u32 {
    fn from(reg: Abort) -> Self {
        reg.0
    }
}

impl Register for Abort {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "ABORT";
}

bitfield! {
    /// Control/status register at DP address 0x4.
    #[derive(Clone, Copy, Default)]
    pub struct Ctrl(u32);
    impl Debug;
    pub csyspwrupack, _: 31;
    pub csyspwrupreq, set_csyspwrupreq: 30;
    pub cdbgpwrupack, _: 29;
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    pub cdbgrstack, _: 27;
    pub cdbgrstreq, set_cdbgrstreq: 26;
    pub wdataerr, _: 7;
    pub readok, _: 6;
    pub stickyerr, _: 5;
    pub stickycmp, _: 4;
    pub stickyorun, _: 1;
    pub orundetect, set_orundetect: 0;
}

impl From<u32> for Ctrl {
    fn from(raw: u32) -> Self {
        Ctrl(raw)
    }
}

impl From<Ctrl> for u32 {
    fn from(reg: Ctrl) -> Self {
        reg.0
    }
}

impl Register for Ctrl {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "CTRL/STAT";
}

bitfield! {
    /// AP/DP bank select register at DP address 0x8.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct Select(u32);
    impl Debug;
    pub u8, ap_sel, set_ap_sel: 31, 24;
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl From<u32> for Select {
    fn from(raw: u32) -> Self {
        Select(raw)
    }
}

impl From<Select> for u32 {
    fn from(reg: Select) -> Self {
        reg.0
    }
}

impl Register for Select {
    const ADDRESS: u8 = 0x8;
    const NAME: &'static str = "SELECT";
}

bitfield! {
    /// Read buffer at DP address 0xC; returns the last posted AP read.
    #[derive(Clone, Copy)]
    pub struct RdBuff(u32);
    impl Debug;
    pub u32, value, _: 31, 0;
}

impl From<u32> for RdBuff {
    fn from(raw: u32) -> Self {
        RdBuff(raw)
    }
}

impl From<RdBuff> for u32 {
    fn from(reg: RdBuff) -> Self {
        reg.0
    }
}

impl Register for RdBuff {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "RDBUFF";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_clear_all_sets_the_four_clear_bits() {
        let value: u32 = Abort::clear_all_sticky().into();
        assert_eq!(value, 0b11110);
    }

    #[test]
    fn ctrl_power_up_requests() {
        let mut ctrl = Ctrl::default();
        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        let value: u32 = ctrl.into();
        assert_eq!(value, (1 << 30) | (1 << 28));
    }

    #[test]
    fn dpidr_field_extraction() {
        // A PSoC6 answers 0x6BA02477: DPv2, designer ARM.
        let idr = DPIDR::from(0x6BA0_2477);
        assert_eq!(idr.version(), 2);
        assert_eq!(idr.part_no(), 0xBA);
        assert_eq!(idr.revision(), 0x6);
    }

    #[test]
    fn select_packs_ap_and_bank() {
        let mut select = Select::default();
        select.set_ap_sel(0x01);
        select.set_ap_bank_sel(0xF);
        let value: u32 = select.into();
        assert_eq!(value, 0x0100_00F0);
    }
}
