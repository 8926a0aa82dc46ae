use crate::{
    error::{Result, TurboError},
    ffi,
    library::TurboJpeg,
    pixel::{Flags, Layout, PixelFormat, Subsampling, to_c_int},
};
use std::{
    ffi::{c_int, c_ulong, c_void},
    ptr::NonNull,
    sync::Arc,
};

/// Image dimensions and chroma subsampling read from a JPEG header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: usize,
    pub height: usize,
    pub subsampling: Subsampling,
}

/// One live native decompressor (`tjInitDecompress`).
///
/// The native handle is destroyed exactly once, when this value is dropped.
pub struct Decompressor {
    handle: NonNull<c_void>,
    turbo: Arc<TurboJpeg>,
}

// A tjhandle may move between threads; it is never used from two at once
// because every native call goes through &mut self.
unsafe impl Send for Decompressor {}

impl Decompressor {
    /// Create a fresh native decompressor.
    ///
    /// # Errors
    /// `Initialization` with the native error string when `tjInitDecompress` returns null.
    pub fn new(turbo: &Arc<TurboJpeg>) -> Result<Self> {
        // SAFETY: tjInitDecompress has no preconditions
        let handle = unsafe { (turbo.api().init_decompress)() };
        match NonNull::new(handle) {
            Some(handle) => {
                log::debug!("created decompressor {:p}", handle);
                Ok(Decompressor {
                    handle,
                    turbo: Arc::clone(turbo),
                })
            }
            None => {
                // SAFETY: null handle selects the global error string
                let (code, message) = unsafe { turbo.failure(std::ptr::null_mut(), -1) };
                Err(TurboError::Initialization { code, message })
            }
        }
    }

    /// Raw native handle, for identity checks and diagnostics
    pub fn as_raw(&self) -> ffi::TjHandle {
        self.handle.as_ptr()
    }

    pub fn library(&self) -> &Arc<TurboJpeg> {
        &self.turbo
    }

    /// Parse the JPEG header in `jpeg`.
    ///
    /// # Errors
    /// `Decode` carrying the native error string when the data is not a readable JPEG.
    pub fn read_header(&mut self, jpeg: &[u8]) -> Result<Header> {
        let jpeg_size = source_size(jpeg)?;
        let mut width: c_int = 0;
        let mut height: c_int = 0;
        let mut subsampling: c_int = 0;

        // SAFETY: handle is live and owned, jpeg is valid for jpeg_size bytes
        let status = unsafe {
            (self.turbo.api().decompress_header2)(
                self.handle.as_ptr(),
                jpeg.as_ptr(),
                jpeg_size,
                &mut width,
                &mut height,
                &mut subsampling,
            )
        };
        if status != 0 {
            return Err(self.decode_failure(status));
        }

        if width <= 0 || height <= 0 {
            return Err(TurboError::Decode {
                code: -1,
                message: format!("invalid image dimensions {width}x{height}"),
            });
        }

        Ok(Header {
            width: width as usize,
            height: height as usize,
            subsampling: Subsampling::from_code(subsampling),
        })
    }

    /// Decompress `jpeg` as a `header.width` x `header.height` image into `dst`.
    ///
    /// `layout` must already be validated against `dst`, `format` and `header`.
    pub(crate) fn decompress(
        &mut self,
        jpeg: &[u8],
        header: &Header,
        dst: &mut [u8],
        layout: Layout,
        format: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        let jpeg_size = source_size(jpeg)?;
        let (_, pitch, _) = layout.native()?;
        let width = to_c_int(header.width, "width")?;
        let height = to_c_int(header.height, "height")?;
        debug_assert!(dst.len() >= layout.pitch * header.height);

        // SAFETY: handle is live and owned; dst holds at least pitch * height bytes
        let status = unsafe {
            (self.turbo.api().decompress2)(
                self.handle.as_ptr(),
                jpeg.as_ptr(),
                jpeg_size,
                dst.as_mut_ptr(),
                width,
                pitch,
                height,
                format.code(),
                flags.bits(),
            )
        };
        if status != 0 {
            return Err(self.decode_failure(status));
        }
        Ok(())
    }

    /// Decompress `jpeg` to planar YUV (`tjDecompressToYUV`): the Y plane
    /// followed by the U and V planes, each row padded to 4 bytes. Grayscale
    /// images produce only the Y plane.
    ///
    /// # Errors
    /// `Unsupported` when the library lacks the YUV entry points, `InvalidArgument`
    /// for an unknown subsampling, `Decode` when the native call fails.
    pub fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        header: &Header,
        flags: Flags,
    ) -> Result<Vec<u8>> {
        let Some(decompress_to_yuv) = self.turbo.api().decompress_to_yuv else {
            return Err(TurboError::Unsupported(format!(
                "{} does not export tjDecompressToYUV",
                self.turbo.origin()
            )));
        };
        let jpeg_size = source_size(jpeg)?;
        let size = self
            .turbo
            .yuv_buffer_size(header.width, header.height, header.subsampling)?;
        let mut planes = vec![0u8; size];

        // SAFETY: handle is live and owned; planes holds tjBufSizeYUV bytes for this header
        let status = unsafe {
            decompress_to_yuv(
                self.handle.as_ptr(),
                jpeg.as_ptr(),
                jpeg_size,
                planes.as_mut_ptr(),
                flags.bits(),
            )
        };
        if status != 0 {
            return Err(self.decode_failure(status));
        }
        Ok(planes)
    }

    fn decode_failure(&self, status: c_int) -> TurboError {
        // SAFETY: handle is live; this is the first native call after the failure
        let (code, message) = unsafe { self.turbo.failure(self.handle.as_ptr(), status) };
        TurboError::Decode { code, message }
    }
}

impl Drop for Decompressor {
    fn drop(&mut self) {
        // SAFETY: handle is live and this is its only owner
        let status = unsafe { (self.turbo.api().destroy)(self.handle.as_ptr()) };
        if status != 0 {
            log::warn!("tjDestroy failed for decompressor {:p}", self.handle);
        }
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Decompressor").field(&self.handle).finish()
    }
}

pub(crate) fn source_size(jpeg: &[u8]) -> Result<c_ulong> {
    c_ulong::try_from(jpeg.len()).map_err(|_| {
        TurboError::invalid(format!("{} byte source exceeds the native size range", jpeg.len()))
    })
}
