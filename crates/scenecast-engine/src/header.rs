//! Raw `.blend` header sniffing.
//!
//! This is the last-resort tier: it never touches Blender, only reads the
//! first few bytes of the file. Layout of the legacy header:
//!
//! | Bytes | Meaning |
//! |-------|---------|
//! | 0..7  | magic `BLENDER` |
//! | 7     | pointer width: `_` = 32-bit, `-` = 64-bit |
//! | 8     | endianness: `v` = little, `V` = big |
//! | 9..12 | ASCII version digits, e.g. `293` |
//!
//! Blender 5.x writes an extended header where bytes 7..9 are the ASCII header
//! length (`17`), followed by the pointer code, a two-digit format version, the
//! endian code and four version digits.
//!
//! Only the magic and the minimum length gate recognition. Marker bytes are
//! decoded leniently: anything but `_` reads as 64-bit and anything but `V`
//! reads as little endian, the layout every current Blender writes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Serialize, Serializer};

/// Magic tag at offset 0.
pub const BLEND_MAGIC: &[u8; 7] = b"BLENDER";

/// Minimum number of bytes needed to recognize a header.
pub const LEGACY_HEADER_LEN: usize = 12;

/// Length of the extended (Blender 5.x) header.
pub const EXTENDED_HEADER_LEN: usize = 17;

/// Pointer width recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointerWidth {
    #[serde(rename = "32-bit")]
    Bits32,
    #[serde(rename = "64-bit")]
    Bits64,
}

impl PointerWidth {
    /// Decodes the pointer-width marker byte; unknown codes read as 64-bit.
    pub fn from_code(code: u8) -> Self {
        match code {
            b'_' => PointerWidth::Bits32,
            _ => PointerWidth::Bits64,
        }
    }
}

/// Byte order recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Decodes the endianness marker byte; unknown codes read as little endian.
    pub fn from_code(code: u8) -> Self {
        match code {
            b'V' => Endianness::Big,
            _ => Endianness::Little,
        }
    }
}

/// Which header layout the file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    Legacy,
    Extended,
}

/// What the header tells us without opening the file in Blender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderInfo {
    #[serde(serialize_with = "serialize_magic")]
    pub magic: [u8; 7],
    pub version: String,
    pub pointer_width: PointerWidth,
    pub endianness: Endianness,
    pub layout: HeaderLayout,
    pub file_size: u64,
}

fn serialize_magic<S: Serializer>(magic: &[u8; 7], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(magic))
}

/// Reads the header of `path`.
///
/// Returns `None` when the magic does not match, fewer than
/// [`LEGACY_HEADER_LEN`] bytes exist, or the file cannot be read. This never
/// errors.
pub fn sniff(path: &Path) -> Option<HeaderInfo> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "header sniff could not open file");
            return None;
        }
    };

    let mut buf = [0u8; EXTENDED_HEADER_LEN];
    let read = read_prefix(&mut file, &mut buf).ok()?;
    let (mut info, _) = parse_header(&buf[..read])?;

    info.file_size = file.seek(SeekFrom::End(0)).ok()?;
    Some(info)
}

/// Parses a header from raw bytes.
///
/// `file_size` is left at zero; [`sniff`] fills it from the file itself.
/// Also returns the number of header bytes consumed.
pub fn parse_header(bytes: &[u8]) -> Option<(HeaderInfo, usize)> {
    if bytes.len() < LEGACY_HEADER_LEN || &bytes[..7] != BLEND_MAGIC {
        return None;
    }

    // A truncated extended header still reads as legacy.
    if bytes.len() >= EXTENDED_HEADER_LEN && bytes[7].is_ascii_digit() && bytes[8].is_ascii_digit()
    {
        return Some(parse_extended(bytes));
    }

    Some((
        HeaderInfo {
            magic: *BLEND_MAGIC,
            version: ascii_lossy(&bytes[9..12]),
            pointer_width: PointerWidth::from_code(bytes[7]),
            endianness: Endianness::from_code(bytes[8]),
            layout: HeaderLayout::Legacy,
            file_size: 0,
        },
        LEGACY_HEADER_LEN,
    ))
}

fn parse_extended(bytes: &[u8]) -> (HeaderInfo, usize) {
    (
        HeaderInfo {
            magic: *BLEND_MAGIC,
            version: ascii_lossy(&bytes[13..17]),
            pointer_width: PointerWidth::from_code(bytes[9]),
            endianness: Endianness::from_code(bytes[12]),
            layout: HeaderLayout::Extended,
            file_size: 0,
        },
        EXTENDED_HEADER_LEN,
    )
}

/// Keeps printable ASCII, drops everything else.
fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii() && !b.is_ascii_control())
        .map(|&b| b as char)
        .collect()
}

/// Reads until `buf` is full or EOF.
fn read_prefix(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
