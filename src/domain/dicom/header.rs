//! DICOM 头解析
//!
//! 只读取到 (0022,0001) 之前的元素，提取 Study / Series / SOP Instance UID。
//! 不要求像素数据等后续内容完整有效。
//!
//! 支持：
//! - Part 10 文件（128 字节前导 + `DICM` + 文件元信息组）
//! - 无前导的裸数据集
//! - Implicit / Explicit VR Little Endian

use super::{DicomError, DicomUidTriplet};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
const DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1.99";

const TAG_TRANSFER_SYNTAX: Tag = Tag(0x0002, 0x0010);
const TAG_SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
const TAG_STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
const TAG_SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
/// 解析上限
const TAG_UNTIL: Tag = Tag(0x0022, 0x0001);

const TAG_ITEM: Tag = Tag(0xFFFE, 0xE000);
const TAG_ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
const TAG_SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// 嵌套序列的最大深度
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Tag(u16, u16);

impl Tag {
    fn is_delimiter(&self) -> bool {
        self.0 == 0xFFFE
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    explicit: bool,
}

struct ElementHeader {
    tag: Tag,
    length: u32,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DicomError> {
        if self.remaining() < n {
            return Err(DicomError::InvalidHeader(format!(
                "unexpected end of data at offset {}",
                self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DicomError> {
        self.take(n).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, DicomError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DicomError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn tag(&mut self) -> Result<Tag, DicomError> {
        Ok(Tag(self.u16()?, self.u16()?))
    }

    fn element_header(&mut self) -> Result<ElementHeader, DicomError> {
        let tag = self.tag()?;

        // 分隔符没有 VR，长度固定 4 字节
        if tag.is_delimiter() || !self.explicit {
            let length = self.u32()?;
            return Ok(ElementHeader { tag, length });
        }

        let vr = self.take(2)?;
        let length = if has_long_length(vr) {
            self.skip(2)?;
            self.u32()?
        } else {
            u32::from(self.u16()?)
        };
        Ok(ElementHeader { tag, length })
    }

    /// 跳过未定义长度的值（序列或封装像素数据），直到序列分隔符
    fn skip_undefined(&mut self, depth: usize) -> Result<(), DicomError> {
        if depth > MAX_DEPTH {
            return Err(DicomError::InvalidHeader("sequence nesting too deep".into()));
        }
        loop {
            let tag = self.tag()?;
            let length = self.u32()?;
            match tag {
                TAG_SEQUENCE_DELIMITATION => return Ok(()),
                TAG_ITEM if length == UNDEFINED_LENGTH => self.skip_item(depth + 1)?,
                TAG_ITEM => self.skip(length as usize)?,
                other => {
                    return Err(DicomError::InvalidHeader(format!(
                        "unexpected tag ({:04X},{:04X}) inside sequence",
                        other.0, other.1
                    )))
                }
            }
        }
    }

    /// 跳过未定义长度的 item，直到 item 分隔符
    fn skip_item(&mut self, depth: usize) -> Result<(), DicomError> {
        loop {
            let header = self.element_header()?;
            if header.tag == TAG_ITEM_DELIMITATION {
                return Ok(());
            }
            if header.length == UNDEFINED_LENGTH {
                self.skip_undefined(depth)?;
            } else {
                self.skip(header.length as usize)?;
            }
        }
    }
}

/// 这些 VR 使用 2 字节保留位 + 4 字节长度
fn has_long_length(vr: &[u8]) -> bool {
    matches!(
        vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR"
            | b"UT" | b"UV"
    )
}

fn looks_like_vr(bytes: &[u8]) -> bool {
    bytes.len() == 2 && bytes.iter().all(|b| b.is_ascii_uppercase())
}

fn decode_uid(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .trim_start()
        .to_string()
}

/// 解析文件元信息组，返回数据集起始位置和传输语法
fn read_file_meta(data: &[u8]) -> Result<(usize, Option<String>), DicomError> {
    let mut cursor = Cursor {
        data,
        pos: PREAMBLE_LEN + MAGIC.len(),
        explicit: true,
    };
    let mut transfer_syntax = None;

    while cursor.remaining() >= 4 {
        let group = u16::from_le_bytes([data[cursor.pos], data[cursor.pos + 1]]);
        if group != 0x0002 {
            break;
        }
        let header = cursor.element_header()?;
        let value = cursor.take(header.length as usize)?;
        if header.tag == TAG_TRANSFER_SYNTAX {
            transfer_syntax = Some(decode_uid(value));
        }
    }

    Ok((cursor.pos, transfer_syntax))
}

/// 从 DICOM 对象头读取 UID 三元组（Instance 层级）
pub fn read_uids(data: &[u8]) -> Result<DicomUidTriplet, DicomError> {
    let has_preamble = data.len() >= PREAMBLE_LEN + MAGIC.len()
        && &data[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC;

    let (start, explicit) = if has_preamble {
        let (start, transfer_syntax) = read_file_meta(data)?;
        match transfer_syntax.as_deref() {
            Some(IMPLICIT_VR_LITTLE_ENDIAN) => (start, false),
            Some(ts @ (EXPLICIT_VR_BIG_ENDIAN | DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN)) => {
                return Err(DicomError::UnsupportedTransferSyntax(ts.to_string()))
            }
            _ => (start, true),
        }
    } else {
        // 裸数据集：通过第一个元素的 VR 位置猜测编码方式
        let explicit = data.len() >= 6 && looks_like_vr(&data[4..6]);
        (0, explicit)
    };

    let mut cursor = Cursor {
        data,
        pos: start,
        explicit,
    };

    let mut study = None;
    let mut series = None;
    let mut sop = None;

    while cursor.remaining() >= 8 {
        let header = cursor.element_header()?;
        if header.tag >= TAG_UNTIL {
            break;
        }

        if header.length == UNDEFINED_LENGTH {
            cursor.skip_undefined(0)?;
            continue;
        }

        let value = cursor.take(header.length as usize)?;
        match header.tag {
            TAG_SOP_INSTANCE_UID => sop = Some(decode_uid(value)),
            TAG_STUDY_INSTANCE_UID => study = Some(decode_uid(value)),
            TAG_SERIES_INSTANCE_UID => series = Some(decode_uid(value)),
            _ => {}
        }

        if study.is_some() && series.is_some() && sop.is_some() {
            break;
        }
    }

    let study = study
        .filter(|s| !s.is_empty())
        .ok_or(DicomError::MissingTag("StudyInstanceUID (0020,000D)"))?;
    let series = series
        .filter(|s| !s.is_empty())
        .ok_or(DicomError::MissingTag("SeriesInstanceUID (0020,000E)"))?;
    let sop = sop
        .filter(|s| !s.is_empty())
        .ok_or(DicomError::MissingTag("SOPInstanceUID (0008,0018)"))?;

    Ok(DicomUidTriplet::instance(study, series, sop))
}

fn pad(value: &str) -> Vec<u8> {
    pad_bytes(value.as_bytes())
}

fn encode_explicit(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + value.len());
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&element.to_le_bytes());
    out.extend_from_slice(vr);
    if has_long_length(vr) {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    } else {
        out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(value);
    out
}

/// 生成最小的 Explicit VR Little Endian Part 10 对象
///
/// 只包含传输语法、三个 UID 以及作为像素数据的 `body`，用于替身归档与测试
pub fn encode_part10(study: &str, series: &str, sop: &str, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; PREAMBLE_LEN];
    out.extend_from_slice(MAGIC);
    out.extend(encode_explicit(
        TAG_TRANSFER_SYNTAX.0,
        TAG_TRANSFER_SYNTAX.1,
        b"UI",
        &pad(EXPLICIT_VR_LITTLE_ENDIAN),
    ));
    out.extend(encode_explicit(0x0008, 0x0018, b"UI", &pad(sop)));
    out.extend(encode_explicit(0x0020, 0x000D, b"UI", &pad(study)));
    out.extend(encode_explicit(0x0020, 0x000E, b"UI", &pad(series)));
    out.extend(encode_explicit(0x7FE0, 0x0010, b"OB", &pad_bytes(body)));
    out
}

fn pad_bytes(body: &[u8]) -> Vec<u8> {
    let mut bytes = body.to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 构造 DICOM 元素的测试工具

    pub use super::encode_part10 as part10;

    pub fn explicit_element(group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Vec<u8> {
        super::encode_explicit(group, element, vr, value)
    }

    pub fn implicit_element(group: u16, element: u16, value: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&group.to_le_bytes());
        out.extend_from_slice(&element.to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(value);
        out
    }

    pub fn padded(value: &str) -> Vec<u8> {
        super::pad(value)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_read_uids_from_part10() {
        let data = part10("1.2.3", "1.2.3.4", "1.2.3.4.5", b"pixels");
        let uids = read_uids(&data).unwrap();
        assert_eq!(uids.study_instance_uid(), "1.2.3");
        assert_eq!(uids.series_instance_uid(), Some("1.2.3.4"));
        assert_eq!(uids.sop_instance_uid(), Some("1.2.3.4.5"));
    }

    #[test]
    fn test_read_uids_ignores_truncated_body() {
        let mut data = part10("1.2", "1.2.3", "1.2.3.4", &[0u8; 64]);
        data.truncate(data.len() - 40);
        assert!(read_uids(&data).is_ok());
    }

    #[test]
    fn test_read_uids_implicit_raw_dataset() {
        let mut data = Vec::new();
        data.extend(implicit_element(0x0008, 0x0018, &padded("9.8.7")));
        data.extend(implicit_element(0x0020, 0x000D, &padded("9")));
        data.extend(implicit_element(0x0020, 0x000E, &padded("9.8")));
        let uids = read_uids(&data).unwrap();
        assert_eq!(uids.study_instance_uid(), "9");
        assert_eq!(uids.sop_instance_uid(), Some("9.8.7"));
    }

    #[test]
    fn test_skips_undefined_length_sequence() {
        let mut data = Vec::new();
        data.extend(explicit_element(0x0008, 0x0018, b"UI", &padded("1.1.1")));
        // (0008,1140) SQ，未定义长度，含一个未定义长度的 item
        data.extend_from_slice(&0x0008u16.to_le_bytes());
        data.extend_from_slice(&0x1140u16.to_le_bytes());
        data.extend_from_slice(b"SQ");
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        data.extend_from_slice(&0xE000u16.to_le_bytes());
        data.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        data.extend(explicit_element(0x0008, 0x1155, b"UI", &padded("5.5")));
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        data.extend_from_slice(&0xE00Du16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        data.extend_from_slice(&0xE0DDu16.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend(explicit_element(0x0020, 0x000D, b"UI", &padded("1")));
        data.extend(explicit_element(0x0020, 0x000E, b"UI", &padded("1.1")));

        let uids = read_uids(&data).unwrap();
        assert_eq!(uids.series_instance_uid(), Some("1.1"));
    }

    #[test]
    fn test_missing_series_uid() {
        let mut data = Vec::new();
        data.extend(explicit_element(0x0008, 0x0018, b"UI", &padded("1.1.1")));
        data.extend(explicit_element(0x0020, 0x000D, b"UI", &padded("1")));
        data.extend(explicit_element(0x0022, 0x0001, b"US", &[0, 0]));
        data.extend(explicit_element(0x0020, 0x000E, b"UI", &padded("never")));
        assert!(matches!(read_uids(&data), Err(DicomError::MissingTag(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(read_uids(b"not a dicom file at all").is_err());
    }
}
