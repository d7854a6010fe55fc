/// An image in the detector's input layout: NV21 (luma plane followed by
/// interleaved V/U pairs at half resolution).
///
/// Produced from a [`Frame`](super::frame::Frame) right before detection and
/// consumed by the detector call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    rotation: i32,
}

impl ConvertedImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32, rotation: i32) -> Self {
        debug_assert_eq!(
            data.len(),
            nv21_len(width, height),
            "data length must equal width * height * 3 / 2"
        );
        Self {
            data,
            width,
            height,
            rotation,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Clockwise rotation in degrees the detector should apply.
    pub fn rotation(&self) -> i32 {
        self.rotation
    }
}

/// Byte length of an NV21 buffer: `w*h` luma plus `w*h/2` chroma.
pub fn nv21_len(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}
