//! Gens movie (GMV) replay.
//!
//! A GMV file is a 64 byte header followed by three bytes per frame. Buttons
//! are stored active-low: byte 0 and 1 carry pads one and two as
//! `START C B A RIGHT LEFT DOWN UP` (high bit first), byte 2 packs the six
//! button extras of both pads as `MODE Z Y X` nibbles, pad two high.

use std::{fs, path::Path};

use crate::{error::MovieError, input::PadButtons};

pub const MOVIE_MAGIC: &[u8] = b"Gens Movie TEST";
const HEADER_LEN: usize = 0x40;
const FRAME_LEN: usize = 3;
const TITLE_AT: usize = 0x18;
const TITLE_LEN: usize = 30;

/// Console region a movie was recorded on, when the header names one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieRegion {
    Usa,
    Europe,
}

#[derive(Debug, Clone)]
pub struct Movie {
    data: Vec<u8>,
}

impl Movie {
    pub fn parse(data: Vec<u8>) -> Result<Self, MovieError> {
        if data.len() < HEADER_LEN + FRAME_LEN {
            return Err(MovieError::TooShort { len: data.len() });
        }
        if !data.starts_with(MOVIE_MAGIC) {
            return Err(MovieError::BadMagic);
        }
        Ok(Self { data })
    }

    pub fn load(path: &Path) -> Result<Self, MovieError> {
        let data = fs::read(path).map_err(|source| MovieError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(data)
    }

    /// Number of complete frames recorded.
    pub fn frames(&self) -> u32 {
        ((self.data.len() - HEADER_LEN) / FRAME_LEN) as u32
    }

    pub fn six_button(&self) -> bool {
        self.data[0x14] == b'6'
    }

    /// Only newer movie revisions record the region.
    pub fn region(&self) -> Option<MovieRegion> {
        (self.data[0xf] >= b'A').then(|| {
            if self.data[0x16] & 0x80 != 0 {
                MovieRegion::Europe
            } else {
                MovieRegion::Usa
            }
        })
    }

    pub fn title(&self) -> String {
        let raw = &self.data[TITLE_AT..TITLE_AT + TITLE_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
    }

    /// Pad state recorded for `frame`, or `None` past the end of the movie.
    pub fn pads(&self, frame: u32) -> Option<[PadButtons; 2]> {
        let at = frame as usize * FRAME_LEN + HEADER_LEN;
        let rec = self.data.get(at..at + FRAME_LEN)?;
        let (p0, p1, extra) = (rec[0], rec[1], rec[2]);

        let mut pads = [decode_pad(p0), decode_pad(p1)];
        pads[0] |= decode_extra(extra);
        pads[1] |= decode_extra(extra >> 4);
        Some(pads)
    }
}

fn pressed(byte: u8, bit: u8) -> bool {
    byte & bit == 0
}

fn decode_pad(byte: u8) -> PadButtons {
    // Directions and START share their bit positions with the pad layout.
    let mut pad = PadButtons::from_bits_truncate(u16::from(!byte & 0x8f));
    for (bit, button) in [
        (0x10, PadButtons::A),
        (0x20, PadButtons::B),
        (0x40, PadButtons::C),
    ] {
        if pressed(byte, bit) {
            pad |= button;
        }
    }
    pad
}

/// Decodes one `MODE Z Y X` nibble.
fn decode_extra(nibble: u8) -> PadButtons {
    let mut pad = PadButtons::empty();
    for (bit, button) in [
        (0x1, PadButtons::X),
        (0x2, PadButtons::Y),
        (0x4, PadButtons::Z),
        (0x8, PadButtons::MODE),
    ] {
        if pressed(nibble, bit) {
            pad |= button;
        }
    }
    pad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(frames: &[[u8; 3]]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data[..MOVIE_MAGIC.len()].copy_from_slice(MOVIE_MAGIC);
        for f in frames {
            data.extend_from_slice(f);
        }
        data
    }

    #[test]
    fn rejects_short_and_foreign_files() {
        assert!(matches!(
            Movie::parse(movie(&[])),
            Err(MovieError::TooShort { len: 64 })
        ));
        let mut data = movie(&[[0xff; 3]]);
        data[0] = b'g';
        assert!(matches!(Movie::parse(data), Err(MovieError::BadMagic)));
    }

    #[test]
    fn idle_frame_decodes_to_no_buttons() {
        let m = Movie::parse(movie(&[[0xff; 3]])).unwrap();
        assert_eq!(m.frames(), 1);
        assert_eq!(m.pads(0), Some([PadButtons::empty(); 2]));
        assert_eq!(m.pads(1), None);
    }

    #[test]
    fn buttons_are_active_low() {
        let m = Movie::parse(movie(&[
            // Pad 1: UP, RIGHT, A, START. Pad 2: C, DOWN.
            // Extras: pad 1 X and MODE, pad 2 Z.
            [!0x99, !0x42, !0x49],
            [!0x20, 0xff, !0x20],
        ]))
        .unwrap();

        assert_eq!(
            m.pads(0),
            Some([
                PadButtons::UP
                    | PadButtons::RIGHT
                    | PadButtons::A
                    | PadButtons::START
                    | PadButtons::X
                    | PadButtons::MODE,
                PadButtons::DOWN | PadButtons::C | PadButtons::Z,
            ])
        );
        assert_eq!(m.pads(1), Some([PadButtons::B, PadButtons::Y]));
    }

    #[test]
    fn header_fields() {
        let mut data = movie(&[[0xff; 3]]);
        data[0xf] = b'B';
        data[0x14] = b'6';
        data[0x16] = 0x80;
        data[TITLE_AT..TITLE_AT + 10].copy_from_slice(b"any% run  ");
        let m = Movie::parse(data).unwrap();
        assert!(m.six_button());
        assert_eq!(m.region(), Some(MovieRegion::Europe));
        assert_eq!(m.title(), "any% run");

        let m = Movie::parse(movie(&[[0xff; 3]])).unwrap();
        assert!(!m.six_button());
        assert_eq!(m.region(), None);
        assert_eq!(m.title(), "");
    }
}
