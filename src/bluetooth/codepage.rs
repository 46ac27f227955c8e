// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! DOS/OEM Latin-2 (code page 852) encoding.
//!
//! Serial peripherals on the other end of the link expect one byte per
//! character in CP852. The lower half of the code page is ASCII; the upper
//! half is the table below.

/// Byte written for characters that have no CP852 mapping.
pub const REPLACEMENT: u8 = b'?';

/// Characters for bytes 0x80..=0xFF, in byte order.
const HIGH_HALF: [char; 128] = [
    // 0x80
    '\u{00C7}', '\u{00FC}', '\u{00E9}', '\u{00E2}', '\u{00E4}', '\u{016F}', '\u{0107}', '\u{00E7}',
    '\u{0142}', '\u{00EB}', '\u{0150}', '\u{0151}', '\u{00EE}', '\u{0179}', '\u{00C4}', '\u{0106}',
    // 0x90
    '\u{00C9}', '\u{0139}', '\u{013A}', '\u{00F4}', '\u{00F6}', '\u{013D}', '\u{013E}', '\u{015A}',
    '\u{015B}', '\u{00D6}', '\u{00DC}', '\u{0164}', '\u{0165}', '\u{0141}', '\u{00D7}', '\u{010D}',
    // 0xA0
    '\u{00E1}', '\u{00ED}', '\u{00F3}', '\u{00FA}', '\u{0104}', '\u{0105}', '\u{017D}', '\u{017E}',
    '\u{0118}', '\u{0119}', '\u{00AC}', '\u{017A}', '\u{010C}', '\u{015F}', '\u{00AB}', '\u{00BB}',
    // 0xB0
    '\u{2591}', '\u{2592}', '\u{2593}', '\u{2502}', '\u{2524}', '\u{00C1}', '\u{00C2}', '\u{011A}',
    '\u{015E}', '\u{2563}', '\u{2551}', '\u{2557}', '\u{255D}', '\u{017B}', '\u{017C}', '\u{2510}',
    // 0xC0
    '\u{2514}', '\u{2534}', '\u{252C}', '\u{251C}', '\u{2500}', '\u{253C}', '\u{0102}', '\u{0103}',
    '\u{255A}', '\u{2554}', '\u{2569}', '\u{2566}', '\u{2560}', '\u{2550}', '\u{256C}', '\u{00A4}',
    // 0xD0
    '\u{0111}', '\u{0110}', '\u{010E}', '\u{00CB}', '\u{010F}', '\u{0147}', '\u{00CD}', '\u{00CE}',
    '\u{011B}', '\u{2518}', '\u{250C}', '\u{2588}', '\u{2584}', '\u{0162}', '\u{016E}', '\u{2580}',
    // 0xE0
    '\u{00D3}', '\u{00DF}', '\u{00D4}', '\u{0143}', '\u{0144}', '\u{0148}', '\u{0160}', '\u{0161}',
    '\u{0154}', '\u{00DA}', '\u{0155}', '\u{0170}', '\u{00FD}', '\u{00DD}', '\u{0163}', '\u{00B4}',
    // 0xF0
    '\u{00AD}', '\u{02DD}', '\u{02DB}', '\u{02C7}', '\u{02D8}', '\u{00A7}', '\u{00F7}', '\u{00B8}',
    '\u{00B0}', '\u{00A8}', '\u{02D9}', '\u{0171}', '\u{0158}', '\u{0159}', '\u{25A0}', '\u{00A0}',
];

/// Map a single character to its CP852 byte, if it has one.
pub fn encode_char(c: char) -> Option<u8> {
    if c.is_ascii() {
        return Some(c as u8);
    }
    HIGH_HALF
        .iter()
        .position(|&mapped| mapped == c)
        .map(|index| 0x80 + index as u8)
}

/// Decode a single CP852 byte.
pub fn decode_byte(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        HIGH_HALF[(byte - 0x80) as usize]
    }
}

/// Encode text as CP852.
///
/// Unmappable characters become [`REPLACEMENT`], one per UTF-16 code unit,
/// so a character outside the Basic Multilingual Plane yields two bytes.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match encode_char(c) {
            Some(byte) => out.push(byte),
            None => out.extend(std::iter::repeat(REPLACEMENT).take(c.len_utf16())),
        }
    }
    out
}

/// Decode CP852 bytes into text.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(encode("Hello, HC-06!"), b"Hello, HC-06!".to_vec());
    }

    #[test]
    fn test_central_european_letters() {
        // "Žluťoučký kůň"
        let encoded = encode("Žluťoučký kůň");
        assert_eq!(
            encoded,
            vec![0xA6, b'l', b'u', 0x9C, b'o', b'u', 0x9F, b'k', 0xEC, b' ', b'k', 0x85, 0xE5]
        );
        assert_eq!(decode(&encoded), "Žluťoučký kůň");
    }

    #[test]
    fn test_polish_letters() {
        assert_eq!(encode("łąść"), vec![0x88, 0xA5, 0x98, 0x86]);
    }

    #[test]
    fn test_unmappable_characters() {
        assert_eq!(encode("€"), vec![REPLACEMENT]);
        // Outside the BMP: one replacement per UTF-16 code unit.
        assert_eq!(encode("a😀b"), vec![b'a', REPLACEMENT, REPLACEMENT, b'b']);
    }

    #[test]
    fn test_table_is_bijective() {
        for byte in 0x80..=0xFFu8 {
            assert_eq!(encode_char(decode_byte(byte)), Some(byte), "byte {:#04x}", byte);
        }
    }
}
