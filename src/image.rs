//! Internal picture representation used between the codec backends, the
//! transform filters and the surfaces.
//!
//! An `Image` owns its plane buffers. Linesizes are tight by default but may
//! carry padding; every copy in and out of an image therefore walks plane
//! rows explicitly.

use crate::param::FourCc;
use crate::status::{VplError, VplResult};

#[derive(Debug, Clone)]
pub struct Image {
    pub fourcc: FourCc,
    pub width: u16,
    pub height: u16,
    pub planes: Vec<Vec<u8>>,
    pub linesize: Vec<usize>,
    pub pts: u64,
}

impl Image {
    /// Allocate an image with tightly packed planes.
    pub fn alloc(fourcc: FourCc, width: u16, height: u16) -> Image {
        let mut planes = Vec::new();
        let mut linesize = Vec::new();
        for idx in 0..fourcc.plane_count() {
            let (row_bytes, rows) = fourcc.plane_dims(idx, width, height);
            planes.push(vec![0u8; row_bytes * rows]);
            linesize.push(row_bytes);
        }
        Image {
            fourcc,
            width,
            height,
            planes,
            linesize,
            pts: 0,
        }
    }

    /// Total payload size of the tightly packed form.
    pub fn packed_len(fourcc: FourCc, width: u16, height: u16) -> usize {
        (0..fourcc.plane_count())
            .map(|idx| {
                let (row_bytes, rows) = fourcc.plane_dims(idx, width, height);
                row_bytes * rows
            })
            .sum()
    }

    /// Append all planes, tightly packed, to `out`.
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        for idx in 0..self.planes.len() {
            let (row_bytes, rows) = self.fourcc.plane_dims(idx, self.width, self.height);
            let src = &self.planes[idx];
            let pitch = self.linesize[idx];
            for row in 0..rows {
                out.extend_from_slice(&src[row * pitch..row * pitch + row_bytes]);
            }
        }
    }

    /// Rebuild an image from its tightly packed form.
    pub fn from_packed(fourcc: FourCc, width: u16, height: u16, data: &[u8]) -> VplResult<Image> {
        if data.len() != Image::packed_len(fourcc, width, height) {
            return Err(VplError::UndefinedBehavior);
        }
        let mut image = Image::alloc(fourcc, width, height);
        let mut off = 0;
        for idx in 0..image.planes.len() {
            let len = image.planes[idx].len();
            image.planes[idx].copy_from_slice(&data[off..off + len]);
            off += len;
        }
        Ok(image)
    }
}

/// Row-by-row plane copy between buffers with different pitches.
pub fn copy_plane(
    dst: &mut [u8],
    dst_pitch: usize,
    src: &[u8],
    src_pitch: usize,
    row_bytes: usize,
    rows: usize,
) {
    for row in 0..rows {
        let d = row * dst_pitch;
        let s = row * src_pitch;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_sizes_follow_plane_geometry() {
        let img = Image::alloc(FourCc::I420, 96, 64);
        assert_eq!(img.planes.len(), 3);
        assert_eq!(img.planes[0].len(), 96 * 64);
        assert_eq!(img.planes[1].len(), 48 * 32);
        assert_eq!(img.linesize, vec![96, 48, 48]);
    }

    #[test]
    fn packed_round_trip_preserves_planes() {
        let mut img = Image::alloc(FourCc::Nv12, 16, 8);
        img.planes[0].iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);
        img.planes[1].iter_mut().enumerate().for_each(|(i, b)| *b = (i * 3) as u8);

        let mut packed = Vec::new();
        img.write_packed(&mut packed);
        assert_eq!(packed.len(), Image::packed_len(FourCc::Nv12, 16, 8));

        let back = Image::from_packed(FourCc::Nv12, 16, 8, &packed).unwrap();
        assert_eq!(back.planes, img.planes);
    }

    #[test]
    fn from_packed_rejects_wrong_length() {
        let err = Image::from_packed(FourCc::I420, 16, 8, &[0u8; 3]).unwrap_err();
        assert_eq!(err, VplError::UndefinedBehavior);
    }

    #[test]
    fn copy_plane_handles_pitch_mismatch() {
        // 4x2 source rows inside an 8-byte pitch destination
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 16];
        copy_plane(&mut dst, 8, &src, 4, 4, 2);
        assert_eq!(&dst[0..4], &[1, 2, 3, 4]);
        assert_eq!(&dst[8..12], &[5, 6, 7, 8]);
        assert_eq!(&dst[4..8], &[0, 0, 0, 0]);
    }
}
