// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::ImageError;
use std::sync::Arc;

/// Co-processor program bytes together with the link-time bounds they were
/// taken from. Immutable once built; clones share the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    start_addr: u64,
    end_addr: u64,
    data: Arc<[u8]>,
}

impl ProgramImage {
    /// Image whose bounds are `start_addr..end_addr` (end exclusive).
    pub fn new(start_addr: u64, end_addr: u64, data: Vec<u8>) -> Result<Self, ImageError> {
        if end_addr < start_addr {
            return Err(ImageError::Inverted {
                start: start_addr,
                end: end_addr,
            });
        }
        if end_addr - start_addr != data.len() as u64 {
            return Err(ImageError::LengthMismatch {
                start: start_addr,
                end: end_addr,
                len: data.len(),
            });
        }
        Ok(Self {
            start_addr,
            end_addr,
            data: data.into(),
        })
    }

    /// Image with no meaningful link address, e.g. read from a `.bin` file.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            start_addr: 0,
            end_addr: data.len() as u64,
            data: data.into(),
        }
    }

    pub fn start_addr(&self) -> u64 {
        self.start_addr
    }

    pub fn end_addr(&self) -> u64 {
        self.end_addr
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Flat RTC slow memory backing the ULP reserve.
#[derive(Debug)]
pub struct RtcSlowMemory {
    pub data: Vec<u8>,
}

impl RtcSlowMemory {
    pub fn new(size: usize) -> Self {
        Self { data: vec![0; size] }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.data.get(offset..end)
    }

    /// Copies `bytes` to `offset`. Nothing is written unless the whole range fits.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    pub fn zero(&mut self, offset: usize, len: usize) -> bool {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].fill(0);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_bounds() {
        let img = ProgramImage::new(0x3f40_0000, 0x3f40_0004, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(img.len(), 4);
        assert_eq!(img.end_addr() - img.start_addr(), 4);

        assert_eq!(
            ProgramImage::new(0x10, 0x0c, vec![]),
            Err(ImageError::Inverted {
                start: 0x10,
                end: 0x0c
            })
        );
        assert!(matches!(
            ProgramImage::new(0x10, 0x14, vec![0; 3]),
            Err(ImageError::LengthMismatch { len: 3, .. })
        ));
    }

    #[test]
    fn test_clone_shares_bytes() {
        let img = ProgramImage::from_bytes(vec![0xAA; 8]);
        let copy = img.clone();
        assert_eq!(img.bytes().as_ptr(), copy.bytes().as_ptr());
    }

    #[test]
    fn test_memory_write_is_all_or_nothing() {
        let mut mem = RtcSlowMemory::new(16);

        assert!(mem.write(0, &[1, 2, 3]));
        assert_eq!(mem.read(0, 3), Some(&[1u8, 2, 3][..]));

        // Overlaps end boundary
        assert!(!mem.write(14, &[9, 9, 9]));
        assert_eq!(mem.read(14, 2), Some(&[0u8, 0][..]));

        // Exact fit at the end
        assert!(mem.write(14, &[0xAA, 0xBB]));
        assert_eq!(mem.read(14, 2), Some(&[0xAAu8, 0xBB][..]));

        assert!(mem.zero(0, 2));
        assert_eq!(mem.read(0, 3), Some(&[0u8, 0, 3][..]));
        assert!(!mem.zero(15, 2));
        assert_eq!(mem.read(15, 2), None);
    }
}
