//! Region classification and row merging of parsed firmware segments.

use std::collections::HashMap;
use std::path::Path;

use crate::target::memory_map::{self, RegionTag};
use crate::target::DeviceFamily;

use super::{elf, hex, ParseError, Segment};

/// A firmware image sorted into the PSoC6 region buckets, with segments in
/// the same bucket merged whenever their flash rows touch or are separated
/// by at most one whole row.
///
/// `order` remembers the sequence in which regions first received data; the
/// HEX serializer replays it so a re-emitted file keeps the original region
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareRecord {
    application_flash: Vec<Segment>,
    ecc_flash: Vec<Segment>,
    eeprom: Vec<Segment>,
    sflash: Vec<Segment>,
    xip: Vec<Segment>,
    nv_user: Option<Segment>,
    nv_wo: Option<Segment>,
    checksum: Option<Segment>,
    flash_protection: Option<Segment>,
    metadata: Option<Segment>,
    chip_protection: Option<Segment>,
    efuse: Option<Segment>,
    order: Vec<RegionTag>,
}

impl FirmwareRecord {
    /// Classify `segments` into buckets and merge row-adjacent neighbours.
    ///
    /// Segments whose start address lies outside every mapped region are
    /// dropped.
    pub fn from_segments(segments: Vec<Segment>, row_size: u32) -> Self {
        let mut record = FirmwareRecord::default();
        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            match memory_map::region_of(segment.first()) {
                Some(region) => record.insert(region.tag, segment),
                None => {
                    tracing::debug!(
                        "Dropping segment at {:#010x} ({} bytes): unmapped address",
                        segment.first(),
                        segment.len()
                    );
                }
            }
        }
        record.merge_adjacent_rows(row_size);
        record
    }

    /// Parse Intel-HEX text into a record, using the PSoC6 row size.
    pub fn from_hex_str(text: &str) -> Result<Self, ParseError> {
        let row_size = DeviceFamily::default_family().row_size;
        Ok(Self::from_segments(hex::parse(text)?, row_size))
    }

    /// Read and parse an Intel-HEX file.
    pub fn from_hex_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_hex_str(&text)
    }

    /// Parse an ELF32 image into a record, using the PSoC6 row size.
    pub fn from_elf_bytes(elf_data: &[u8]) -> Result<Self, ParseError> {
        let row_size = DeviceFamily::default_family().row_size;
        Ok(Self::from_segments(
            elf::loadable_segments(elf_data)?,
            row_size,
        ))
    }

    /// Read and parse an ELF32 file.
    pub fn from_elf_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let data = std::fs::read(path)?;
        Self::from_elf_bytes(&data)
    }

    /// Application flash segments, ready for row programming.
    pub fn application_flash(&self) -> &[Segment] {
        &self.application_flash
    }

    /// ECC flash segments (empty on PSoC6).
    pub fn ecc_flash(&self) -> &[Segment] {
        &self.ecc_flash
    }

    /// Emulated-EEPROM segments.
    pub fn eeprom(&self) -> &[Segment] {
        &self.eeprom
    }

    /// Supervisory flash segments, across all sub-regions.
    pub fn sflash(&self) -> &[Segment] {
        &self.sflash
    }

    /// External XIP segments.
    pub fn xip(&self) -> &[Segment] {
        &self.xip
    }

    /// The HEX-virtual checksum row, if the file carried one.
    pub fn checksum(&self) -> Option<&Segment> {
        self.checksum.as_ref()
    }

    /// Flash protection bits, if present.
    pub fn flash_protection(&self) -> Option<&Segment> {
        self.flash_protection.as_ref()
    }

    /// The HEX-virtual metadata row, if present.
    pub fn metadata(&self) -> Option<&Segment> {
        self.metadata.as_ref()
    }

    /// Chip protection byte, if present.
    pub fn chip_protection(&self) -> Option<&Segment> {
        self.chip_protection.as_ref()
    }

    /// eFuse data, if present.
    pub fn efuse(&self) -> Option<&Segment> {
        self.efuse.as_ref()
    }

    /// Region tags in first-insertion order, one per live segment or slot.
    pub fn order(&self) -> &[RegionTag] {
        &self.order
    }

    /// Total number of application-flash bytes, the unit progress reports in.
    pub fn program_byte_count(&self) -> u64 {
        self.application_flash.iter().map(|s| s.len() as u64).sum()
    }

    /// All segments in `order` sequence, for serialization.
    pub fn segments_in_order(&self) -> Vec<&Segment> {
        let mut positions: HashMap<RegionTag, usize> = HashMap::new();
        let mut out = Vec::new();

        for &tag in &self.order {
            let position = positions.entry(tag).or_insert(0);
            let segment = match tag {
                RegionTag::ApplicationFlash => self.application_flash.get(*position),
                RegionTag::EccFlash => self.ecc_flash.get(*position),
                RegionTag::Eeprom => self.eeprom.get(*position),
                RegionTag::SFlash => self.sflash.get(*position),
                RegionTag::Xip => self.xip.get(*position),
                RegionTag::NVuser => self.nv_user.as_ref(),
                RegionTag::NVWO => self.nv_wo.as_ref(),
                RegionTag::Checksum => self.checksum.as_ref(),
                RegionTag::FlashProtection => self.flash_protection.as_ref(),
                RegionTag::MetaData => self.metadata.as_ref(),
                RegionTag::ChipProtection => self.chip_protection.as_ref(),
                RegionTag::EFuse => self.efuse.as_ref(),
            };
            *position += 1;
            if let Some(segment) = segment {
                out.push(segment);
            }
        }
        out
    }

    /// Serialize the record back to Intel-HEX text, in `order` sequence.
    pub fn to_hex(&self) -> String {
        hex::serialize(self.segments_in_order())
    }

    fn insert(&mut self, tag: RegionTag, segment: Segment) {
        use RegionTag::*;
        match tag {
            ApplicationFlash => {
                self.application_flash.push(segment);
                self.order.push(tag);
            }
            EccFlash => {
                self.ecc_flash.push(segment);
                self.order.push(tag);
            }
            Eeprom => {
                self.eeprom.push(segment);
                self.order.push(tag);
            }
            SFlash => {
                self.sflash.push(segment);
                self.order.push(tag);
            }
            Xip => {
                self.xip.push(segment);
                self.order.push(tag);
            }
            NVuser => set_single(&mut self.nv_user, &mut self.order, tag, segment),
            NVWO => set_single(&mut self.nv_wo, &mut self.order, tag, segment),
            Checksum => set_single(&mut self.checksum, &mut self.order, tag, segment),
            FlashProtection => {
                set_single(&mut self.flash_protection, &mut self.order, tag, segment)
            }
            MetaData => set_single(&mut self.metadata, &mut self.order, tag, segment),
            ChipProtection => {
                set_single(&mut self.chip_protection, &mut self.order, tag, segment)
            }
            EFuse => set_single(&mut self.efuse, &mut self.order, tag, segment),
        }
    }

    /// Merge neighbouring segments in every list bucket.
    fn merge_adjacent_rows(&mut self, row_size: u32) {
        debug_assert!(row_size.is_power_of_two());
        merge_bucket(
            &mut self.application_flash,
            &mut self.order,
            RegionTag::ApplicationFlash,
            row_size,
        );
        merge_bucket(&mut self.ecc_flash, &mut self.order, RegionTag::EccFlash, row_size);
        merge_bucket(&mut self.eeprom, &mut self.order, RegionTag::Eeprom, row_size);
        merge_bucket(&mut self.sflash, &mut self.order, RegionTag::SFlash, row_size);
        merge_bucket(&mut self.xip, &mut self.order, RegionTag::Xip, row_size);
    }
}

fn set_single(
    slot: &mut Option<Segment>,
    order: &mut Vec<RegionTag>,
    tag: RegionTag,
    segment: Segment,
) {
    if slot.is_none() {
        order.push(tag);
    }
    *slot = Some(segment);
}

/// Whether two segments are close enough, row-wise, to merge: at most one
/// whole row may lie between the row holding `lead_last` and the row holding
/// `trail_first`.
fn rows_close(lead_last: u32, trail_first: u32, row_size: u32) -> bool {
    let mask = !(row_size - 1);
    let lead_row = lead_last & mask;
    let trail_row = trail_first & mask;
    trail_row >= lead_row && trail_row - lead_row <= 2 * row_size
}

/// Walk neighbouring pairs of one bucket in reverse so removals keep the
/// remaining indices stable, merging pairs whose rows are close. The byte
/// gap between merged segments is filled with zeros.
fn merge_bucket(
    segments: &mut Vec<Segment>,
    order: &mut Vec<RegionTag>,
    tag: RegionTag,
    row_size: u32,
) {
    let mut index = segments.len().saturating_sub(1);
    while index >= 1 {
        let prev = &segments[index - 1];
        let curr = &segments[index];

        let merged = if curr.first() > prev.last() && rows_close(prev.last(), curr.first(), row_size)
        {
            let gap = (curr.first() - prev.last() - 1) as usize;
            let mut bytes = prev.bytes().to_vec();
            bytes.resize(bytes.len() + gap, 0x00);
            bytes.extend_from_slice(curr.bytes());
            Some(Segment::new(prev.first(), bytes))
        } else if prev.first() > curr.last() && rows_close(curr.last(), prev.first(), row_size) {
            let gap = (prev.first() - curr.last() - 1) as usize;
            let mut bytes = curr.bytes().to_vec();
            bytes.resize(bytes.len() + gap, 0x00);
            bytes.extend_from_slice(prev.bytes());
            Some(Segment::new(curr.first(), bytes))
        } else {
            None
        };

        if let Some(segment) = merged {
            segments[index - 1] = segment;
            segments.remove(index);
            remove_nth_occurrence(order, tag, index);
        }
        index -= 1;
    }
}

/// Remove the `n`-th (0-based) occurrence of `tag` from `order`.
fn remove_nth_occurrence(order: &mut Vec<RegionTag>, tag: RegionTag, n: usize) {
    let mut seen = 0;
    let position = order.iter().position(|&t| {
        if t == tag {
            let hit = seen == n;
            seen += 1;
            hit
        } else {
            false
        }
    });
    if let Some(position) = position {
        order.remove(position);
    }
}
