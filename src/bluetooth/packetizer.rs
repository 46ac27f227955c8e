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

//! Outbound frame layout.
//!
//! Text is encoded as CP852 and split into frames of exactly `frame_size`
//! bytes. The last frame is right-padded with ASCII spaces.

use std::num::NonZeroUsize;
use tracing::debug;

use super::codepage;

/// Frame size used when none is configured.
pub const DEFAULT_FRAME_SIZE: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(size) => size,
    None => panic!("frame size must be non-zero"),
};

/// Padding byte for the unused tail of the last frame.
pub const PADDING: u8 = b' ';

/// Number of frames needed for `len` encoded bytes.
pub fn frame_count(len: usize, frame_size: NonZeroUsize) -> usize {
    len.div_ceil(frame_size.get())
}

/// Split already-encoded bytes into space-padded frames.
///
/// Empty input yields no frames.
pub fn chunk_bytes(data: &[u8], frame_size: NonZeroUsize) -> Vec<Vec<u8>> {
    data.chunks(frame_size.get())
        .map(|chunk| {
            let mut frame = vec![PADDING; frame_size.get()];
            frame[..chunk.len()].copy_from_slice(chunk);
            frame
        })
        .collect()
}

/// Encode a message into frames ready for the transport.
pub fn encode(message: &str, frame_size: NonZeroUsize) -> Vec<Vec<u8>> {
    let bytes = codepage::encode(message);
    let frames = chunk_bytes(&bytes, frame_size);
    debug!(
        "Packetized {} chars into {} bytes / {} frames of {}",
        message.chars().count(),
        bytes.len(),
        frames.len(),
        frame_size
    );
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_short_message_is_padded() {
        let frames = encode("ABC", size(4));
        assert_eq!(frames, vec![b"ABC ".to_vec()]);
    }

    #[test]
    fn test_empty_message_yields_no_frames() {
        assert!(encode("", size(4)).is_empty());
        assert!(encode("", DEFAULT_FRAME_SIZE).is_empty());
    }

    #[test]
    fn test_exact_multiple_has_no_padding_frame() {
        let frames = encode("ABCDEFGH", size(4));
        assert_eq!(frames, vec![b"ABCD".to_vec(), b"EFGH".to_vec()]);
    }

    #[test]
    fn test_frame_count_and_reconstruction() {
        let message = "Příliš žluťoučký kůň úpěl ďábelské ódy, a pak ještě jednou znovu.";
        let encoded = codepage::encode(message);

        for n in [1, 3, 7, 16, 64, 200] {
            let frames = encode(message, size(n));
            assert_eq!(frames.len(), frame_count(encoded.len(), size(n)));
            assert!(frames.iter().all(|f| f.len() == n));

            let mut joined: Vec<u8> = frames.concat();
            joined.truncate(encoded.len());
            assert_eq!(joined, encoded);
            assert!(frames.concat()[encoded.len()..].iter().all(|&b| b == PADDING));
        }
    }

    #[test]
    fn test_default_frame_size() {
        let message = "x".repeat(65);
        let frames = encode(&message, DEFAULT_FRAME_SIZE);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][0], b'x');
        assert!(frames[1][1..].iter().all(|&b| b == PADDING));
    }

    #[test]
    fn test_frames_carry_cp852_bytes() {
        let frames = encode("čau", size(4));
        assert_eq!(frames, vec![vec![0x9F, b'a', b'u', PADDING]]);
    }

    proptest! {
        #[test]
        fn prop_frames_reassemble_to_encoded_bytes(message in any::<String>(), n in 1usize..=128) {
            let encoded = codepage::encode(&message);
            let frames = encode(&message, size(n));

            // One byte per UTF-16 unit, mapped or replaced.
            prop_assert_eq!(encoded.len(), message.encode_utf16().count());
            prop_assert_eq!(frames.len(), frame_count(encoded.len(), size(n)));
            prop_assert!(frames.iter().all(|f| f.len() == n));

            let joined = frames.concat();
            prop_assert_eq!(&joined[..encoded.len()], &encoded[..]);
            prop_assert!(joined[encoded.len()..].iter().all(|&b| b == PADDING));
            prop_assert!(joined.len() - encoded.len() < n);
        }
    }
}
