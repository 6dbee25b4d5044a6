//! Minimal EXIF orientation patching for JPEG byte streams.
//!
//! Only the `Orientation` entry of IFD0 is touched. An existing entry is
//! rewritten in place. An Exif segment without one gains the entry, with
//! every offset behind it moved to match. A stream with no Exif segment
//! gets a fresh single-entry APP1 after SOI and any JFIF APP0.

use super::StorageError;
use crate::orientation::ExifOrientation;

const SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TYPE_SHORT: u16 = 3;

const ENTRY_LEN: usize = 12;
/// Upper bound on IFDs followed when moving offsets.
const MAX_IFDS: usize = 16;

/// Returns `jpeg` with its orientation tag set to `orientation`.
pub fn stamp_orientation(jpeg: &[u8], orientation: ExifOrientation) -> Result<Vec<u8>, StorageError> {
    if jpeg.get(..2) != Some(&SOI[..]) {
        return Err(StorageError::NotJpeg);
    }

    if let Some(segment) = find_exif_segment(jpeg)? {
        let mut out = jpeg.to_vec();
        if patch_orientation(&mut out[segment.payload.clone()], orientation) {
            tracing::trace!("Patched existing EXIF orientation");
            return Ok(out);
        }
        let Some(payload) = insert_orientation(&jpeg[segment.payload.clone()], orientation) else {
            tracing::warn!("EXIF segment cannot take an orientation entry; left unchanged");
            return Ok(out);
        };
        let Ok(length) = u16::try_from(payload.len() + 2) else {
            tracing::warn!("EXIF segment full; orientation not stamped");
            return Ok(out);
        };

        let mut stamped = Vec::with_capacity(jpeg.len() + ENTRY_LEN);
        stamped.extend_from_slice(&jpeg[..segment.start]);
        stamped.extend_from_slice(&[0xFF, MARKER_APP1]);
        stamped.extend_from_slice(&length.to_be_bytes());
        stamped.extend_from_slice(&payload);
        stamped.extend_from_slice(&jpeg[segment.payload.end..]);
        return Ok(stamped);
    }

    let at = app0_end(jpeg)?;
    let app1 = orientation_segment(orientation);
    let mut stamped = Vec::with_capacity(jpeg.len() + app1.len());
    stamped.extend_from_slice(&jpeg[..at]);
    stamped.extend_from_slice(&app1);
    stamped.extend_from_slice(&jpeg[at..]);
    Ok(stamped)
}

struct Segment {
    /// Offset of the 0xFF marker byte.
    start: usize,
    /// Range of the segment payload following the length field.
    payload: std::ops::Range<usize>,
}

fn find_exif_segment(jpeg: &[u8]) -> Result<Option<Segment>, StorageError> {
    let mut pos = 2;
    loop {
        let Some(&[0xFF, marker]) = jpeg.get(pos..pos + 2) else {
            return Ok(None);
        };
        // Standalone markers and image data end the header section.
        if marker == MARKER_SOS || marker == MARKER_EOI {
            return Ok(None);
        }
        let payload = segment_payload(jpeg, pos)?;
        if marker == MARKER_APP1 && jpeg[payload.clone()].starts_with(EXIF_HEADER) {
            return Ok(Some(Segment { start: pos, payload }));
        }
        pos = payload.end;
    }
}

fn segment_payload(jpeg: &[u8], pos: usize) -> Result<std::ops::Range<usize>, StorageError> {
    let len_bytes = jpeg.get(pos + 2..pos + 4).ok_or(StorageError::Truncated)?;
    let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
    if len < 2 {
        return Err(StorageError::Truncated);
    }
    let payload = pos + 4..pos + 2 + len;
    if payload.end > jpeg.len() {
        return Err(StorageError::Truncated);
    }
    Ok(payload)
}

/// Offset just past a JFIF APP0 directly after SOI, else just past SOI.
fn app0_end(jpeg: &[u8]) -> Result<usize, StorageError> {
    match jpeg.get(2..4) {
        Some(&[0xFF, MARKER_APP0]) => Ok(segment_payload(jpeg, 2)?.end),
        _ => Ok(SOI.len()),
    }
}

/// TIFF byte order.
#[derive(Debug, Clone, Copy)]
struct Order {
    big_endian: bool,
}

impl Order {
    fn detect(tiff: &[u8]) -> Option<Self> {
        match tiff.get(..2)? {
            b"MM" => Some(Self { big_endian: true }),
            b"II" => Some(Self { big_endian: false }),
            _ => None,
        }
    }

    fn u16_at(self, buf: &[u8], at: usize) -> Option<u16> {
        let b: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32_at(self, buf: &[u8], at: usize) -> Option<u32> {
        let b: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    fn put_u16(self, buf: &mut [u8], at: usize, value: u16) -> Option<()> {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf.get_mut(at..at + 2)?.copy_from_slice(&bytes);
        Some(())
    }

    fn put_u32(self, buf: &mut [u8], at: usize, value: u32) -> Option<()> {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        buf.get_mut(at..at + 4)?.copy_from_slice(&bytes);
        Some(())
    }
}

/// Splits an Exif APP1 payload into its byte order, TIFF body and IFD0 offset.
fn parse_tiff(payload: &[u8]) -> Option<(Order, &[u8], usize)> {
    let tiff = payload.get(EXIF_HEADER.len()..)?;
    let order = Order::detect(tiff)?;
    let ifd0 = order.u32_at(tiff, 4)? as usize;
    Some((order, tiff, ifd0))
}

/// Position of the first entry in the IFD at `ifd` tagged `tag`.
fn find_entry(order: Order, tiff: &[u8], ifd: usize, tag: u16) -> Option<usize> {
    let count = order.u16_at(tiff, ifd)?;
    (0..usize::from(count))
        .map(|i| ifd + 2 + i * ENTRY_LEN)
        .find(|&entry| order.u16_at(tiff, entry) == Some(tag))
}

/// Rewrites IFD0's orientation entry inside an APP1 payload. Returns false if absent.
fn patch_orientation(payload: &mut [u8], orientation: ExifOrientation) -> bool {
    let Some((order, _, ifd0)) = parse_tiff(payload) else {
        return false;
    };
    let tiff = &mut payload[EXIF_HEADER.len()..];
    let Some(entry) = find_entry(order, tiff, ifd0, TAG_ORIENTATION) else {
        return false;
    };
    order
        .put_u16(tiff, entry + 8, orientation.tag_value())
        .is_some()
}

/// Rebuilds an APP1 payload with an orientation entry added to IFD0.
///
/// Entries stay sorted by tag. Every offset that pointed at or past the
/// insertion point moves by one entry. Returns `None` for layouts that
/// cannot be followed safely.
fn insert_orientation(payload: &[u8], orientation: ExifOrientation) -> Option<Vec<u8>> {
    let (order, tiff, ifd0) = parse_tiff(payload)?;
    let count = order.u16_at(tiff, ifd0)?;
    let entries = ifd0 + 2;
    // IFD0 entries plus the next-IFD pointer must be present.
    tiff.get(entries..entries + usize::from(count) * ENTRY_LEN + 4)?;

    let index = (0..usize::from(count))
        .find(|&i| {
            order
                .u16_at(tiff, entries + i * ENTRY_LEN)
                .is_some_and(|tag| tag > TAG_ORIENTATION)
        })
        .unwrap_or(usize::from(count));
    let insert_at = entries + index * ENTRY_LEN;

    let mut entry = [0u8; ENTRY_LEN];
    order.put_u16(&mut entry, 0, TAG_ORIENTATION)?;
    order.put_u16(&mut entry, 2, TYPE_SHORT)?;
    order.put_u32(&mut entry, 4, 1)?;
    order.put_u16(&mut entry, 8, orientation.tag_value())?;

    let mut out = Vec::with_capacity(payload.len() + ENTRY_LEN);
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(&tiff[..insert_at]);
    out.extend_from_slice(&entry);
    out.extend_from_slice(&tiff[insert_at..]);

    let moved = &mut out[EXIF_HEADER.len()..];
    order.put_u16(moved, ifd0, count.checked_add(1)?)?;
    let mut visited = Vec::new();
    relocate_ifd(order, moved, ifd0, insert_at, &mut visited)?;
    Some(out)
}

/// Byte size of one value of a TIFF field type.
fn type_size(kind: u16) -> Option<usize> {
    match kind {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Moves the offsets held by the IFD at `at`, then follows its sub-IFDs.
fn relocate_ifd(
    order: Order,
    tiff: &mut [u8],
    at: usize,
    insert_at: usize,
    visited: &mut Vec<usize>,
) -> Option<()> {
    if visited.contains(&at) {
        return Some(());
    }
    if visited.len() >= MAX_IFDS {
        return None;
    }
    visited.push(at);

    let shift = |offset: u32| -> Option<u32> {
        if offset as usize >= insert_at {
            offset.checked_add(ENTRY_LEN as u32)
        } else {
            Some(offset)
        }
    };

    let count = usize::from(order.u16_at(tiff, at)?);
    for i in 0..count {
        let entry = at + 2 + i * ENTRY_LEN;
        let tag = order.u16_at(tiff, entry)?;
        let kind = order.u16_at(tiff, entry + 2)?;
        let values = order.u32_at(tiff, entry + 4)? as usize;
        let pointer = matches!(tag, TAG_EXIF_IFD | TAG_GPS_IFD | TAG_INTEROP_IFD);
        let out_of_line = type_size(kind)?.checked_mul(values)? > 4;
        if !(pointer || out_of_line || tag == TAG_THUMBNAIL_OFFSET) {
            continue;
        }

        let offset = shift(order.u32_at(tiff, entry + 8)?)?;
        order.put_u32(tiff, entry + 8, offset)?;
        if pointer {
            relocate_ifd(order, tiff, offset as usize, insert_at, visited)?;
        }
    }

    let next_at = at + 2 + count * ENTRY_LEN;
    let next = order.u32_at(tiff, next_at)?;
    if next != 0 {
        let next = shift(next)?;
        order.put_u32(tiff, next_at, next)?;
        relocate_ifd(order, tiff, next as usize, insert_at, visited)?;
    }
    Some(())
}

/// Builds a complete APP1 segment holding a big-endian IFD0 with one entry.
fn orientation_segment(orientation: ExifOrientation) -> Vec<u8> {
    let mut tiff = Vec::with_capacity(26);
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&42u16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&TAG_ORIENTATION.to_be_bytes());
    tiff.extend_from_slice(&TYPE_SHORT.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.tag_value().to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let length = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
    let mut segment = Vec::with_capacity(usize::from(length) + 2);
    segment.extend_from_slice(&[0xFF, MARKER_APP1]);
    segment.extend_from_slice(&length.to_be_bytes());
    segment.extend_from_slice(EXIF_HEADER);
    segment.extend_from_slice(&tiff);
    segment
}

/// Reads the orientation tag back out of a JPEG, if present.
#[cfg(test)]
pub(crate) fn read_orientation(jpeg: &[u8]) -> Option<u16> {
    let segment = find_exif_segment(jpeg).ok()??;
    let (order, tiff, ifd0) = parse_tiff(jpeg.get(segment.payload)?)?;
    let entry = find_entry(order, tiff, ifd0, TAG_ORIENTATION)?;
    order.u16_at(tiff, entry + 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG_MAKE: u16 = 0x010F;
    const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
    const TYPE_ASCII: u16 = 2;
    const TYPE_LONG: u16 = 4;
    const DATE: &[u8; 20] = b"2024:03:07 09:05:02\0";

    /// SOI, an APP0 JFIF stub, then EOI.
    fn bare_jpeg() -> Vec<u8> {
        let mut jpeg = vec![0xFF, 0xD8];
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x07]);
        jpeg.extend_from_slice(b"JFIF\0");
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn wrap_app1(tiff: &[u8]) -> Vec<u8> {
        let len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, MARKER_APP1];
        jpeg.extend_from_slice(&len.to_be_bytes());
        jpeg.extend_from_slice(EXIF_HEADER);
        jpeg.extend_from_slice(tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn le_entry(tiff: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&count.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    }

    /// APP1 with a little-endian IFD0 holding an orientation entry.
    fn jpeg_with_le_orientation(value: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&1u16.to_le_bytes());
        le_entry(&mut tiff, TAG_ORIENTATION, TYPE_SHORT, 1, u32::from(value));
        tiff.extend_from_slice(&0u32.to_le_bytes());
        wrap_app1(&tiff)
    }

    /// IFD0 {Make="ACME", ExifIFD} with no orientation; the Exif IFD holds
    /// DateTimeOriginal. Both strings live out of line, after the IFDs.
    fn jpeg_with_make_and_exif_ifd() -> Vec<u8> {
        let ifd0 = 8u32;
        let make_at = ifd0 + 2 + 2 * 12 + 4;
        let exif_at = make_at + 6;
        let date_at = exif_at + 2 + 12 + 4;

        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&ifd0.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        le_entry(&mut tiff, TAG_MAKE, TYPE_ASCII, 5, make_at);
        le_entry(&mut tiff, TAG_EXIF_IFD, TYPE_LONG, 1, exif_at);
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(b"ACME\0\0");
        tiff.extend_from_slice(&1u16.to_le_bytes());
        le_entry(&mut tiff, TAG_DATE_TIME_ORIGINAL, TYPE_ASCII, 20, date_at);
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(DATE);
        wrap_app1(&tiff)
    }

    fn tiff_of(jpeg: &[u8]) -> (Order, &[u8], usize) {
        let segment = find_exif_segment(jpeg).unwrap().unwrap();
        parse_tiff(&jpeg[segment.payload]).unwrap()
    }

    fn ascii_value(order: Order, tiff: &[u8], ifd: usize, tag: u16) -> Vec<u8> {
        let entry = find_entry(order, tiff, ifd, tag).unwrap();
        let len = order.u32_at(tiff, entry + 4).unwrap() as usize;
        let at = order.u32_at(tiff, entry + 8).unwrap() as usize;
        tiff[at..at + len].to_vec()
    }

    #[test]
    fn test_inserts_segment_after_jfif_header() {
        let stamped = stamp_orientation(&bare_jpeg(), ExifOrientation::Rotate90).unwrap();
        assert_eq!(&stamped[..4], &[0xFF, 0xD8, 0xFF, MARKER_APP0]);
        assert_eq!(&stamped[11..13], &[0xFF, MARKER_APP1]);
        assert_eq!(read_orientation(&stamped), Some(6));
        assert!(stamped.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn test_inserts_segment_after_soi_without_app0() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xD9];
        let stamped = stamp_orientation(&jpeg, ExifOrientation::FlipHorizontal).unwrap();
        assert_eq!(&stamped[..4], &[0xFF, 0xD8, 0xFF, MARKER_APP1]);
        assert_eq!(read_orientation(&stamped), Some(2));
    }

    #[test]
    fn test_patches_existing_entry_in_place() {
        let original = jpeg_with_le_orientation(1);
        let stamped = stamp_orientation(&original, ExifOrientation::Transverse).unwrap();
        assert_eq!(stamped.len(), original.len());
        assert_eq!(read_orientation(&stamped), Some(7));
    }

    #[test]
    fn test_adds_entry_and_keeps_existing_tags() {
        let original = jpeg_with_make_and_exif_ifd();
        let stamped = stamp_orientation(&original, ExifOrientation::Rotate90).unwrap();

        assert_eq!(stamped.len(), original.len() + ENTRY_LEN);
        assert_eq!(read_orientation(&stamped), Some(6));

        let (order, tiff, ifd0) = tiff_of(&stamped);
        let tags: Vec<u16> = (0..3)
            .map(|i| order.u16_at(tiff, ifd0 + 2 + i * ENTRY_LEN).unwrap())
            .collect();
        assert_eq!(tags, vec![TAG_MAKE, TAG_ORIENTATION, TAG_EXIF_IFD]);
        assert_eq!(ascii_value(order, tiff, ifd0, TAG_MAKE), b"ACME\0");

        let pointer = find_entry(order, tiff, ifd0, TAG_EXIF_IFD).unwrap();
        let exif_ifd = order.u32_at(tiff, pointer + 8).unwrap() as usize;
        assert_eq!(
            ascii_value(order, tiff, exif_ifd, TAG_DATE_TIME_ORIGINAL),
            DATE.to_vec()
        );
    }

    #[test]
    fn test_restamping_keeps_a_single_segment() {
        let once = stamp_orientation(&bare_jpeg(), ExifOrientation::Normal).unwrap();
        let twice = stamp_orientation(&once, ExifOrientation::Rotate180).unwrap();
        assert_eq!(once.len(), twice.len());
        assert_eq!(read_orientation(&twice), Some(3));
    }

    #[test]
    fn test_unreadable_exif_is_left_unchanged() {
        let mut original = jpeg_with_make_and_exif_ifd();
        // Point IFD0 past the end of the segment.
        original[16..20].copy_from_slice(&0xFFFFu32.to_le_bytes());
        let stamped = stamp_orientation(&original, ExifOrientation::Rotate90).unwrap();
        assert_eq!(stamped, original);
    }

    #[test]
    fn test_rejects_non_jpeg() {
        assert!(matches!(
            stamp_orientation(b"not a jpeg", ExifOrientation::Normal),
            Err(StorageError::NotJpeg)
        ));
    }

    #[test]
    fn test_rejects_truncated_segment() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x40, 0x01];
        assert!(matches!(
            stamp_orientation(&jpeg, ExifOrientation::Normal),
            Err(StorageError::Truncated)
        ));
    }
}
