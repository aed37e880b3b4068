//! Intel-HEX parsing and serialization.
//!
//! Record-level syntax (field layout, checksum, byte count) is delegated to
//! the `ihex` crate; this module owns the segment semantics on top: data
//! records either continue the running segment or start a new one, and the
//! address-extension records force a break.

use ihex::{Record, ReaderError};

use super::{ParseError, Segment};

/// Payload bytes per emitted data record.
const RECORD_BYTES: usize = 64;

/// Parse Intel-HEX text into segments.
///
/// Lines may end in CR, LF or CRLF; empty lines are ignored. Parsing stops
/// at the end-of-file record.
pub fn parse(text: &str) -> Result<Vec<Segment>, ParseError> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut upper: u32 = 0;
    let mut next_address: Option<u32> = None;

    let lines = text
        .split(['\r', '\n'])
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    for (line_number, line) in lines {
        let record =
            Record::from_record_string(line).map_err(|e| reader_error(line_number, e))?;

        match record {
            Record::Data { offset, value } => {
                if value.is_empty() {
                    continue;
                }
                let address = upper.wrapping_add(u32::from(offset));
                let continues = next_address == Some(address) && !segments.is_empty();
                if continues {
                    let current = segments.last_mut().expect("checked non-empty above");
                    current.push_bytes(&value);
                } else {
                    segments.push(Segment::new(address, value));
                }
                let current = segments.last().expect("a data record always leaves a segment");
                next_address = Some(current.last().wrapping_add(1));
            }
            Record::EndOfFile => break,
            Record::ExtendedSegmentAddress(base) => {
                upper = u32::from(base) << 4;
                next_address = None;
            }
            Record::StartSegmentAddress { .. } => {}
            Record::ExtendedLinearAddress(base) => {
                upper = u32::from(base) << 16;
                next_address = None;
            }
            Record::StartLinearAddress(entry) => {
                tracing::debug!("Image entry point: {:#010x}", entry);
                next_address = None;
            }
        }
    }

    Ok(segments)
}

/// Serialize segments back to Intel-HEX text.
///
/// Data records carry up to 64 bytes and never cross a 64 KiB page; an
/// extended-linear record is emitted whenever the upper address half
/// changes. The output is LF-separated and ends with the end-of-file record.
pub fn serialize<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> String {
    let mut records = Vec::new();
    let mut current_upper: u32 = 0;

    for segment in segments {
        let mut address = segment.first();
        let mut bytes = segment.bytes();

        while !bytes.is_empty() {
            let upper = address >> 16;
            if upper != current_upper {
                records.push(Record::ExtendedLinearAddress(upper as u16));
                current_upper = upper;
            }

            let offset = address & 0xFFFF;
            let page_left = (0x1_0000 - offset) as usize;
            let take = bytes.len().min(RECORD_BYTES).min(page_left);

            records.push(Record::Data {
                offset: offset as u16,
                value: bytes[..take].to_vec(),
            });
            address = address.wrapping_add(take as u32);
            bytes = &bytes[take..];
        }
    }

    records.push(Record::EndOfFile);
    ihex::create_object_file_representation(&records)
        .expect("64-byte data records always serialize. This is a bug, please report it.")
}

fn reader_error(line: usize, error: ReaderError) -> ParseError {
    match error {
        ReaderError::ChecksumMismatch(..) => ParseError::HexChecksum { line },
        ReaderError::PayloadLengthMismatch
        | ReaderError::RecordTooShort
        | ReaderError::RecordTooLong
        | ReaderError::RecordNotEvenLength => ParseError::HexLength { line },
        other => ParseError::HexRecord {
            line,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> String {
        // 16 zero bytes at offset 0: count 0x10, checksum 0xF0.
        let payload = "00".repeat(16);
        format!(":10000000{payload}F0\r\n:00000001FF")
    }

    #[test]
    fn minimal_file_parses_to_one_zero_segment() {
        let segments = parse(&minimal()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].first(), 0x0000);
        assert_eq!(segments[0].len(), 16);
        assert!(segments[0].bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn minimal_file_round_trips_byte_identical() {
        let input = minimal();
        let segments = parse(&input).unwrap();
        let output = serialize(&segments);
        let emitted: Vec<&str> = output.lines().collect();
        let expected: Vec<&str> = input.lines().collect();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn crlf_cr_and_lf_line_endings_are_accepted() {
        let body = ":0100000041BE";
        for terminator in ["\n", "\r", "\r\n"] {
            let text = format!("{body}{terminator}:00000001FF{terminator}");
            let segments = parse(&text).unwrap();
            assert_eq!(segments.len(), 1);
            assert_eq!(segments[0].bytes(), &[0x41]);
        }
    }

    #[test]
    fn contiguous_data_records_extend_one_segment() {
        let text = ":0400000001020304F2\n:0400040005060708DE\n:00000001FF";
        let segments = parse(text).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn address_gap_starts_a_new_segment() {
        let text = ":0400000001020304F2\n:0400100005060708D2\n:00000001FF";
        let segments = parse(text).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].first(), 0x0000);
        assert_eq!(segments[1].first(), 0x0010);
    }

    #[test]
    fn extended_linear_address_rebases_and_splits() {
        let records = [
            Record::Data {
                offset: 0,
                value: vec![0x01, 0x02],
            },
            Record::ExtendedLinearAddress(0x1000),
            Record::Data {
                offset: 0,
                value: vec![0x03, 0x04],
            },
            Record::EndOfFile,
        ];
        let text = ihex::create_object_file_representation(&records).unwrap();
        let segments = parse(&text).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].first(), 0x0000);
        assert_eq!(segments[1].first(), 0x1000_0000);
        assert_eq!(segments[1].bytes(), &[0x03, 0x04]);
    }

    #[test]
    fn extended_segment_address_scales_by_sixteen() {
        let records = [
            Record::ExtendedSegmentAddress(0x1000),
            Record::Data {
                offset: 0x0010,
                value: vec![0xAA],
            },
            Record::EndOfFile,
        ];
        let text = ihex::create_object_file_representation(&records).unwrap();
        let segments = parse(&text).unwrap();
        assert_eq!(segments[0].first(), 0x1000 * 16 + 0x10);
    }

    #[test]
    fn start_linear_address_forces_a_segment_break() {
        let records = [
            Record::Data {
                offset: 0,
                value: vec![0x01, 0x02],
            },
            Record::StartLinearAddress(0x1000_0000),
            Record::Data {
                offset: 2,
                value: vec![0x03, 0x04],
            },
            Record::EndOfFile,
        ];
        let text = ihex::create_object_file_representation(&records).unwrap();
        let segments = parse(&text).unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn corrupted_payload_byte_is_a_checksum_error() {
        let good = minimal();
        // Flip the last payload byte of the data record from 00 to 01.
        let bad = good.replacen("00F0", "01F0", 1);
        assert!(matches!(
            parse(&bad),
            Err(ParseError::HexChecksum { line: 1 })
        ));
    }

    #[test]
    fn corrupted_checksum_byte_is_a_checksum_error() {
        let good = minimal();
        let bad = good.replacen("F0\r\n", "F1\r\n", 1);
        assert!(matches!(
            parse(&bad),
            Err(ParseError::HexChecksum { line: 1 })
        ));
    }

    #[test]
    fn short_record_is_a_length_error() {
        assert!(matches!(
            parse(":0100"),
            Err(ParseError::HexLength { line: 1 })
        ));
    }

    #[test]
    fn missing_start_code_is_a_record_error() {
        assert!(matches!(
            parse("10000000FF"),
            Err(ParseError::HexRecord { line: 1, .. })
        ));
    }

    #[test]
    fn error_lines_are_counted_across_blank_lines() {
        let text = format!("\n\n{}\nBROKEN\n", ":0100000041BE");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ParseError::HexRecord { line: 4, .. }));
    }

    #[test]
    fn every_serialized_record_checksums_to_zero() {
        let segments = vec![
            Segment::new(0x1000_0000, (0..200u16).map(|v| v as u8).collect()),
            Segment::new(0x9030_0000, vec![0x12, 0x34]),
        ];
        let text = serialize(&segments);
        for line in text.lines() {
            let digits = &line[1..];
            let sum: u32 = (0..digits.len())
                .step_by(2)
                .map(|i| u32::from(u8::from_str_radix(&digits[i..i + 2], 16).unwrap()))
                .sum();
            assert_eq!(sum % 256, 0, "record {line} does not balance");
        }
    }

    #[test]
    fn serializer_chunks_at_sixty_four_bytes() {
        let segment = Segment::new(0x0000_0000, vec![0xAB; 130]);
        let text = serialize(std::iter::once(&segment));
        // Data record byte counts: 64 + 64 + 2, then the end-of-file record.
        let lengths: Vec<u8> = text
            .lines()
            .filter(|l| &l[7..9] == "00")
            .map(|l| u8::from_str_radix(&l[1..3], 16).unwrap())
            .collect();
        assert_eq!(lengths, vec![64, 64, 2]);
    }

    #[test]
    fn serializer_emits_extended_linear_records_at_page_crossings() {
        // 32 bytes straddling the 0x0001_0000 page boundary.
        let segment = Segment::new(0x0000_FFF0, vec![0x55; 32]);
        let text = serialize(std::iter::once(&segment));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with(":10FFF000"));
        assert!(lines[1].starts_with(":02000004"));
        assert!(lines[2].starts_with(":10000000"));
    }

    #[test]
    fn arbitrary_segments_round_trip() {
        let segments = vec![
            Segment::new(0x1000_0000, (0..=255u8).collect()),
            Segment::new(0x1000_0400, vec![0xFF; 512]),
            Segment::new(0x9050_0000, vec![0xDE, 0xAD, 0xBE, 0xEF]),
        ];
        let text = serialize(&segments);
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed, segments);
    }
}
