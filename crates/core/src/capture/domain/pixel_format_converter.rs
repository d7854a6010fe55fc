//! YUV 4:2:0 planar → NV21 conversion, plus NV21 → RGB for detectors that
//! want packed color.

use crate::shared::converted_image::{nv21_len, ConvertedImage};
use crate::shared::frame::{Frame, Plane};

/// Packs a three-plane frame into NV21: the luma plane, then one V/U byte
/// pair per chroma sample, row by row.
///
/// Stride padding never reaches the output. The result is always
/// `w*h + w*h/2` bytes long; with odd dimensions the chroma grid truncates
/// to `w/2` x `h/2` and the tail stays zeroed.
pub fn to_nv21(frame: &Frame) -> Vec<u8> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let mut out = Vec::with_capacity(nv21_len(frame.width(), frame.height()));

    copy_plane(frame.y(), w, h, &mut out);
    interleave_chroma(frame.v(), frame.u(), w / 2, h / 2, &mut out);

    out.resize(nv21_len(frame.width(), frame.height()), 0);
    out
}

/// Converts a frame and wraps it for the detector.
pub fn convert(frame: &Frame, rotation: i32) -> ConvertedImage {
    ConvertedImage::new(to_nv21(frame), frame.width(), frame.height(), rotation)
}

fn copy_plane(plane: &Plane, cols: usize, rows: usize, out: &mut Vec<u8>) {
    let data = plane.data();
    let stride = plane.row_stride();

    if plane.pixel_stride() == 1 {
        if stride == cols {
            out.extend_from_slice(&data[..cols * rows]);
            return;
        }
        for row in 0..rows {
            let start = row * stride;
            out.extend_from_slice(&data[start..start + cols]);
        }
        return;
    }

    let step = plane.pixel_stride();
    for row in 0..rows {
        let start = row * stride;
        out.extend((0..cols).map(|col| data[start + col * step]));
    }
}

fn interleave_chroma(v: &Plane, u: &Plane, cols: usize, rows: usize, out: &mut Vec<u8>) {
    let (v_data, u_data) = (v.data(), u.data());
    for row in 0..rows {
        let mut v_index = row * v.row_stride();
        let mut u_index = row * u.row_stride();
        for _ in 0..cols {
            out.push(v_data[v_index]);
            out.push(u_data[u_index]);
            v_index += v.pixel_stride();
            u_index += u.pixel_stride();
        }
    }
}

/// Decodes an NV21 image to packed RGB24 (BT.601, full range).
pub fn nv21_to_rgb(image: &ConvertedImage) -> Vec<u8> {
    let w = image.width() as usize;
    let h = image.height() as usize;
    let data = image.data();
    let luma = w * h;
    let chroma_cols = w / 2;
    let chroma_rows = h / 2;

    let mut rgb = vec![0u8; luma * 3];
    for row in 0..h {
        for col in 0..w {
            let y = data[row * w + col] as f32;
            let (v, u) = if chroma_cols == 0 || chroma_rows == 0 {
                (0.0, 0.0)
            } else {
                let cr = (row / 2).min(chroma_rows - 1);
                let cc = (col / 2).min(chroma_cols - 1);
                let index = luma + (cr * chroma_cols + cc) * 2;
                (data[index] as f32 - 128.0, data[index + 1] as f32 - 128.0)
            };

            let offset = (row * w + col) * 3;
            rgb[offset] = clamp_to_u8(y + 1.402 * v);
            rgb[offset + 1] = clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v);
            rgb[offset + 2] = clamp_to_u8(y + 1.772 * u);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Luma values count up from 0; padding bytes are 0xEE so leaks show.
    fn padded_luma(width: usize, height: usize, stride: usize) -> Plane {
        let mut data = vec![0xEEu8; stride * height];
        for row in 0..height {
            for col in 0..width {
                data[row * stride + col] = (row * width + col) as u8;
            }
        }
        Plane::new(data, stride, 1)
    }

    fn planar_chroma(width: usize, height: usize, value: u8) -> Plane {
        Plane::new(vec![value; (width / 2) * (height / 2)], width / 2, 1)
    }

    #[test]
    fn test_packed_luma_copied_whole() {
        let frame = Frame::new(
            4,
            2,
            padded_luma(4, 2, 4),
            planar_chroma(4, 2, 10),
            planar_chroma(4, 2, 20),
            0,
        )
        .unwrap();

        let out = to_nv21(&frame);

        assert_eq!(out.len(), 12);
        assert_eq!(&out[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(&out[8..], &[20, 10, 20, 10]);
    }

    #[test]
    fn test_padded_luma_rows_exclude_stride_padding() {
        let (w, h, stride) = (6usize, 4usize, 16usize);
        let frame = Frame::new(
            w as u32,
            h as u32,
            padded_luma(w, h, stride),
            planar_chroma(w, h, 1),
            planar_chroma(w, h, 2),
            0,
        )
        .unwrap();

        let out = to_nv21(&frame);

        assert_eq!(out.len(), w * h + w * h / 2);
        let expected: Vec<u8> = (0..(w * h) as u8).collect();
        assert_eq!(&out[..w * h], expected.as_slice());
        assert!(!out[..w * h].contains(&0xEE));
    }

    #[test]
    fn test_semi_planar_chroma_interleaves_v_then_u() {
        // 4x4 frame, chroma grid 2x2, NV12-style source: U plane is
        // [u0 v0 u1 v1 ...], V plane is the same memory shifted by one.
        let uv_row0 = [10u8, 50, 11, 51];
        let uv_row1 = [12u8, 52, 13, 53];
        let mut interleaved = Vec::new();
        interleaved.extend_from_slice(&uv_row0);
        interleaved.extend_from_slice(&uv_row1);

        let u = Plane::new(interleaved.clone(), 4, 2);
        let v = Plane::new(interleaved[1..].to_vec(), 4, 2);
        let frame = Frame::new(4, 4, padded_luma(4, 4, 4), u, v, 0).unwrap();

        let out = to_nv21(&frame);

        assert_eq!(&out[16..], &[50, 10, 51, 11, 52, 12, 53, 13]);
    }

    #[test]
    fn test_padded_chroma_rows_skip_padding() {
        // Chroma 2x2 with a row stride of 5: 3 padding bytes per row.
        let u = Plane::new(vec![1, 2, 0xEE, 0xEE, 0xEE, 3, 4], 5, 1);
        let v = Plane::new(vec![5, 6, 0xEE, 0xEE, 0xEE, 7, 8], 5, 1);
        let frame = Frame::new(4, 4, padded_luma(4, 4, 4), u, v, 0).unwrap();

        let out = to_nv21(&frame);

        assert_eq!(&out[16..], &[5, 1, 6, 2, 7, 3, 8, 4]);
    }

    #[test]
    fn test_strided_luma_gathered_per_sample() {
        let y = Plane::new(vec![1, 0xEE, 2, 0xEE, 3, 0xEE, 4], 4, 2);
        // 2x2 luma with pixel stride 2, row stride 4 → [1, 2] / [3, 4]
        let frame = Frame::new(
            2,
            2,
            y,
            Plane::new(vec![9], 1, 1),
            Plane::new(vec![8], 1, 1),
            0,
        )
        .unwrap();

        let out = to_nv21(&frame);

        assert_eq!(out, vec![1, 2, 3, 4, 8, 9]);
    }

    #[rstest]
    #[case::even(640, 480)]
    #[case::odd_width(5, 4)]
    #[case::odd_both(3, 3)]
    fn test_output_length_is_nv21_length(#[case] w: usize, #[case] h: usize) {
        let frame = Frame::new(
            w as u32,
            h as u32,
            padded_luma(w, h, w + 3),
            Plane::new(vec![128; (w / 2).max(1) * (h / 2).max(1)], (w / 2).max(1), 1),
            Plane::new(vec![128; (w / 2).max(1) * (h / 2).max(1)], (w / 2).max(1), 1),
            0,
        )
        .unwrap();

        assert_eq!(to_nv21(&frame).len(), w * h + w * h / 2);
    }

    #[test]
    fn test_convert_carries_dimensions_and_rotation() {
        let frame = Frame::new(
            4,
            2,
            padded_luma(4, 2, 4),
            planar_chroma(4, 2, 128),
            planar_chroma(4, 2, 128),
            3,
        )
        .unwrap();

        let image = convert(&frame, 0);

        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 2);
        assert_eq!(image.rotation(), 0);
        assert_eq!(image.data(), to_nv21(&frame).as_slice());
    }

    #[test]
    fn test_nv21_to_rgb_neutral_chroma_is_gray() {
        let mut data = vec![100u8; 16];
        data.extend_from_slice(&[128u8; 8]);
        let image = ConvertedImage::new(data, 4, 4, 0);

        let rgb = nv21_to_rgb(&image);

        assert_eq!(rgb.len(), 48);
        assert!(rgb.iter().all(|&c| c == 100));
    }

    #[test]
    fn test_nv21_to_rgb_red_chroma() {
        // V well above neutral pushes red up and green down.
        let mut data = vec![128u8; 4];
        data.extend_from_slice(&[228, 128]);
        let image = ConvertedImage::new(data, 2, 2, 0);

        let rgb = nv21_to_rgb(&image);

        assert!(rgb[0] > 200);
        assert!(rgb[1] < 100);
        assert_eq!(rgb[2], 128);
    }
}
