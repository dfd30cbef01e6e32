// ABOUTME: PCM decoder implementation
// ABOUTME: Supports 16-bit and 24-bit PCM in either byte order

use crate::audio::decode::Decoder;
use crate::audio::{AudioFormat, Sample};
use crate::error::Error;
use std::sync::Arc;

/// PCM endianness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEndian {
    /// Little-endian byte order
    Little,
    /// Big-endian byte order
    Big,
}

/// PCM audio decoder supporting 16-bit and 24-bit formats
#[derive(Debug, Clone)]
pub struct PcmDecoder {
    bit_depth: u8,
    channels: u8,
    endian: PcmEndian,
}

impl PcmDecoder {
    /// Create a little-endian decoder for `format`.
    ///
    /// Fails for bit depths other than 16 and 24.
    pub fn for_format(format: &AudioFormat) -> Result<Self, Error> {
        Self::with_endian(format, PcmEndian::Little)
    }

    /// Create a decoder with explicit endianness
    pub fn with_endian(format: &AudioFormat, endian: PcmEndian) -> Result<Self, Error> {
        if format.bit_depth != 16 && format.bit_depth != 24 {
            return Err(Error::Protocol(format!(
                "Unsupported bit depth: {}",
                format.bit_depth
            )));
        }
        if format.channels == 0 {
            return Err(Error::Protocol("stream announced zero channels".to_string()));
        }
        Ok(Self {
            bit_depth: format.bit_depth,
            channels: format.channels,
            endian,
        })
    }

    fn bytes_per_frame(&self) -> usize {
        (self.bit_depth as usize / 8) * self.channels as usize
    }
}

impl Decoder for PcmDecoder {
    fn decode(&self, data: &[u8]) -> Result<Arc<[Sample]>, Error> {
        let frame_size = self.bytes_per_frame();
        if data.len() % frame_size != 0 {
            return Err(Error::Protocol(format!(
                "{} bytes is not a multiple of frame size {} ({}-bit, {}ch)",
                data.len(),
                frame_size,
                self.bit_depth,
                self.channels
            )));
        }

        let samples: Vec<Sample> = match (self.bit_depth, self.endian) {
            (16, PcmEndian::Little) => data
                .chunks_exact(2)
                .map(|c| Sample::from_i16(i16::from_le_bytes([c[0], c[1]])))
                .collect(),
            (16, PcmEndian::Big) => data
                .chunks_exact(2)
                .map(|c| Sample::from_i16(i16::from_be_bytes([c[0], c[1]])))
                .collect(),
            (24, PcmEndian::Little) => data
                .chunks_exact(3)
                .map(|c| Sample::from_i24_le([c[0], c[1], c[2]]))
                .collect(),
            (24, PcmEndian::Big) => data
                .chunks_exact(3)
                .map(|c| Sample::from_i24_be([c[0], c[1], c[2]]))
                .collect(),
            _ => {
                return Err(Error::Protocol(format!(
                    "Unsupported bit depth: {}",
                    self.bit_depth
                )))
            }
        };
        Ok(Arc::from(samples.into_boxed_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(bit_depth: u8, channels: u8) -> AudioFormat {
        AudioFormat {
            sample_rate: 48_000,
            channels,
            bit_depth,
        }
    }

    #[test]
    fn test_decode_16bit_little_endian() {
        let decoder = PcmDecoder::for_format(&format(16, 1)).unwrap();
        let samples = decoder.decode(&[0x01, 0x00, 0xFF, 0xFF]).unwrap();
        assert_eq!(&*samples, &[Sample(1 << 8), Sample(-1 << 8)]);
    }

    #[test]
    fn test_decode_24bit_big_endian() {
        let decoder = PcmDecoder::with_endian(&format(24, 1), PcmEndian::Big).unwrap();
        let samples = decoder.decode(&[0x00, 0x00, 0x02]).unwrap();
        assert_eq!(&*samples, &[Sample(2)]);
    }

    #[test]
    fn test_rejects_partial_frames() {
        // 24-bit stereo frames are 6 bytes
        let decoder = PcmDecoder::for_format(&format(24, 2)).unwrap();
        assert!(decoder.decode(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_rejects_unsupported_bit_depth() {
        assert!(PcmDecoder::for_format(&format(32, 2)).is_err());
    }
}
