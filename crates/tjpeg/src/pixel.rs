use crate::{
    error::{Result, TurboError},
    ffi,
};
use std::{ffi::c_int, ops::BitOr};
use tjpeg_base::tensor::element_count;

/// Output (or compression input) pixel layout, matching `TJPF_*`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgb = 0,
    Bgr = 1,
    Rgbx = 2,
    Bgrx = 3,
    Xbgr = 4,
    Xrgb = 5,
    Gray = 6,
    Rgba = 7,
    Bgra = 8,
    Abgr = 9,
    Argb = 10,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 11] = [
        PixelFormat::Rgb,
        PixelFormat::Bgr,
        PixelFormat::Rgbx,
        PixelFormat::Bgrx,
        PixelFormat::Xbgr,
        PixelFormat::Xrgb,
        PixelFormat::Gray,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Argb,
    ];

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Gray => 1,
            _ => 4,
        }
    }

    pub fn code(self) -> c_int {
        self as c_int
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.code() == code)
    }

    /// HWC shape of a `width` x `height` image; single-byte formats have no channel axis.
    pub fn shape(self, width: usize, height: usize) -> Vec<usize> {
        match self.bytes_per_pixel() {
            1 => vec![height, width],
            bpp => vec![height, width, bpp],
        }
    }
}

/// Chroma subsampling of an encoded image, matching `TJSAMP_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsampling {
    S444,
    S422,
    S420,
    Gray,
    S440,
    S411,
    /// A code this binding does not know about, kept as reported.
    Other(i32),
}

impl Subsampling {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Subsampling::S444,
            1 => Subsampling::S422,
            2 => Subsampling::S420,
            3 => Subsampling::Gray,
            4 => Subsampling::S440,
            5 => Subsampling::S411,
            other => Subsampling::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Subsampling::S444 => 0,
            Subsampling::S422 => 1,
            Subsampling::S420 => 2,
            Subsampling::Gray => 3,
            Subsampling::S440 => 4,
            Subsampling::S411 => 5,
            Subsampling::Other(code) => code,
        }
    }
}

/// Flags passed through to the native decompress call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(c_int);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// Rows are written bottom-up.
    pub const BOTTOM_UP: Flags = Flags(ffi::TJFLAG_BOTTOMUP);
    /// Nearest-neighbour chroma upsampling.
    pub const FAST_UPSAMPLE: Flags = Flags(ffi::TJFLAG_FASTUPSAMPLE);
    pub const FAST_DCT: Flags = Flags(ffi::TJFLAG_FASTDCT);
    pub const ACCURATE_DCT: Flags = Flags(ffi::TJFLAG_ACCURATEDCT);

    pub fn bits(self) -> c_int {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Geometry of a validated HWC pixel buffer, in native integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub height: usize,
    pub width: usize,
    /// Bytes per row.
    pub pitch: usize,
}

impl Layout {
    pub fn native(self) -> Result<(c_int, c_int, c_int)> {
        Ok((
            to_c_int(self.width, "width")?,
            to_c_int(self.pitch, "row pitch")?,
            to_c_int(self.height, "height")?,
        ))
    }
}

pub(crate) fn to_c_int(value: usize, what: &str) -> Result<c_int> {
    c_int::try_from(value)
        .map_err(|_| TurboError::invalid(format!("{what} {value} exceeds the native int range")))
}

/// Checks that `shape`/`len` describe a pixel buffer for `format`.
///
/// Accepts `[h, w]` for single-byte formats and `[h, w, bpp]` for all formats.
pub(crate) fn buffer_layout(shape: &[usize], len: usize, format: PixelFormat) -> Result<Layout> {
    let bpp = format.bytes_per_pixel();
    match shape {
        [_, _] if bpp != 1 => {
            return Err(TurboError::invalid(format!(
                "{format:?} needs a 3-D buffer with {bpp} channels, got shape {shape:?}"
            )));
        }
        [_, _] => {}
        [_, _, channels] if *channels != bpp => {
            return Err(TurboError::invalid(format!(
                "{format:?} needs {bpp} channels, got shape {shape:?}"
            )));
        }
        [_, _, _] => {}
        _ => {
            return Err(TurboError::invalid(format!(
                "pixel buffers must be 2-D or 3-D, got shape {shape:?}"
            )));
        }
    }

    let expected = element_count(shape)?;
    if expected != len {
        return Err(TurboError::invalid(format!(
            "buffer holds {len} bytes but shape {shape:?} describes {expected}"
        )));
    }

    let pitch = shape[1].checked_mul(bpp).ok_or_else(|| {
        TurboError::invalid(format!("row of {} pixels overflows the address space", shape[1]))
    })?;

    Ok(Layout {
        height: shape[0],
        width: shape[1],
        pitch,
    })
}

/// Checks that a destination buffer can take a full `width` x `height` decode.
pub(crate) fn destination_layout(
    shape: &[usize],
    len: usize,
    format: PixelFormat,
    width: usize,
    height: usize,
) -> Result<Layout> {
    let layout = buffer_layout(shape, len, format)?;
    if layout.width < width || layout.height < height {
        return Err(TurboError::invalid(format!(
            "destination {}x{} is smaller than the {}x{} image",
            layout.width, layout.height, width, height
        )));
    }

    let required = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| TurboError::invalid("image size overflows"))?;
    if len < required {
        return Err(TurboError::invalid(format!(
            "destination holds {len} bytes, {required} needed"
        )));
    }

    Ok(layout)
}
