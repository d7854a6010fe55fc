use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("{plane} plane has a pixel stride of 0")]
    ZeroPixelStride { plane: &'static str },
    #[error("{plane} plane row stride {row_stride} cannot hold a row of {row_len} bytes")]
    RowStrideTooSmall {
        plane: &'static str,
        row_stride: usize,
        row_len: usize,
    },
    #[error("{plane} plane holds {actual} bytes, needs at least {required}")]
    PlaneTooShort {
        plane: &'static str,
        required: usize,
        actual: usize,
    },
}

/// One color plane of a captured image.
///
/// `row_stride` is the distance in bytes between the starts of two
/// consecutive rows; `pixel_stride` is the distance between two horizontally
/// adjacent samples. Fully planar chroma has a pixel stride of 1, semi-planar
/// (interleaved) chroma a pixel stride of 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    /// Checks the buffer covers `cols` x `rows` samples at the plane's strides.
    ///
    /// The last row may be shorter than `row_stride` (capture drivers commonly
    /// omit the trailing padding), so only the bytes actually addressed count.
    fn validate(&self, name: &'static str, cols: usize, rows: usize) -> Result<(), FrameError> {
        if self.pixel_stride == 0 {
            return Err(FrameError::ZeroPixelStride { plane: name });
        }
        if cols == 0 || rows == 0 {
            return Ok(());
        }
        let row_len = (cols - 1) * self.pixel_stride + 1;
        if rows > 1 && self.row_stride < row_len {
            return Err(FrameError::RowStrideTooSmall {
                plane: name,
                row_stride: self.row_stride,
                row_len,
            });
        }
        let required = (rows - 1) * self.row_stride + row_len;
        if self.data.len() < required {
            return Err(FrameError::PlaneTooShort {
                plane: name,
                required,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A captured YUV 4:2:0 image: full-resolution luma plus two chroma planes
/// at half horizontal and vertical resolution.
///
/// Capture dimensions are assumed even; odd sizes truncate the chroma grid to
/// `width / 2` x `height / 2`.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    y: Plane,
    u: Plane,
    v: Plane,
    sequence: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        y: Plane,
        u: Plane,
        v: Plane,
        sequence: u64,
    ) -> Result<Self, FrameError> {
        let w = width as usize;
        let h = height as usize;
        y.validate("Y", w, h)?;
        u.validate("U", w / 2, h / 2)?;
        v.validate("V", w / 2, h / 2)?;
        Ok(Self {
            width,
            height,
            y,
            u,
            v,
            sequence,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn y(&self) -> &Plane {
        &self.y
    }

    pub fn u(&self) -> &Plane {
        &self.u
    }

    pub fn v(&self) -> &Plane {
        &self.v
    }

    /// Capture order assigned by the producing camera.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
