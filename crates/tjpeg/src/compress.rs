use crate::{
    error::{Result, TurboError},
    ffi,
    library::TurboJpeg,
    pixel::{Flags, PixelFormat, Subsampling, buffer_layout},
};
use std::{
    ffi::{c_int, c_ulong, c_void},
    ptr::NonNull,
    sync::Arc,
};
use tjpeg_base::Tensor;

/// One live native compressor (`tjInitCompress`).
pub struct Compressor {
    handle: NonNull<c_void>,
    turbo: Arc<TurboJpeg>,
}

unsafe impl Send for Compressor {}

impl Compressor {
    pub fn new(turbo: &Arc<TurboJpeg>) -> Result<Self> {
        // SAFETY: tjInitCompress has no preconditions
        let handle = unsafe { (turbo.api().init_compress)() };
        match NonNull::new(handle) {
            Some(handle) => Ok(Compressor {
                handle,
                turbo: Arc::clone(turbo),
            }),
            None => {
                // SAFETY: null handle selects the global error string
                let (code, message) = unsafe { turbo.failure(std::ptr::null_mut(), -1) };
                Err(TurboError::Initialization { code, message })
            }
        }
    }

    /// Encode `image` (shape `[h, w, bpp]`, or `[h, w]` for grayscale) as a JPEG.
    ///
    /// # Errors
    /// `InvalidArgument` for a buffer that does not match `format`, a quality
    /// outside 1..=100, or a subsampling the encoder cannot produce for `format`.
    /// `Encode` with the native message when compression itself fails.
    pub fn compress(
        &mut self,
        image: &Tensor<u8>,
        format: PixelFormat,
        subsampling: Subsampling,
        quality: u8,
    ) -> Result<Vec<u8>> {
        self.compress_with(image, format, subsampling, quality, Flags::NONE)
    }

    pub fn compress_with(
        &mut self,
        image: &Tensor<u8>,
        format: PixelFormat,
        subsampling: Subsampling,
        quality: u8,
        flags: Flags,
    ) -> Result<Vec<u8>> {
        if !(1..=100).contains(&quality) {
            return Err(TurboError::invalid(format!(
                "quality must be within 1..=100, got {quality}"
            )));
        }
        if let Subsampling::Other(code) = subsampling {
            return Err(TurboError::invalid(format!("unknown subsampling code {code}")));
        }
        if format == PixelFormat::Gray && subsampling != Subsampling::Gray {
            return Err(TurboError::invalid(format!(
                "grayscale input needs Subsampling::Gray, got {subsampling:?}"
            )));
        }

        let layout = buffer_layout(&image.shape, image.data.len(), format)?;
        let (width, pitch, height) = layout.native()?;

        // SAFETY: plain arithmetic on its arguments
        let capacity = unsafe { (self.turbo.api().buf_size)(width, height, subsampling.code()) };
        // tjBufSize reports bad arguments as (unsigned long)-1
        if capacity == c_ulong::MAX {
            // SAFETY: null handle selects the global error string
            let (code, message) = unsafe { self.turbo.failure(std::ptr::null_mut(), -1) };
            return Err(TurboError::Encode { code, message });
        }
        let capacity = usize::try_from(capacity)
            .map_err(|_| TurboError::invalid("encoded size exceeds the address space"))?;

        let mut out = vec![0u8; capacity];
        let mut out_ptr = out.as_mut_ptr();
        let mut out_size = capacity as c_ulong;

        // SAFETY: handle is live and owned; the source holds pitch * height
        // bytes; NOREALLOC keeps the encoder inside `out`, which is tjBufSize
        // bytes long
        let status = unsafe {
            (self.turbo.api().compress2)(
                self.handle.as_ptr(),
                image.data.as_ptr(),
                width,
                pitch,
                height,
                format.code(),
                &mut out_ptr,
                &mut out_size,
                subsampling.code(),
                c_int::from(quality),
                flags.bits() | ffi::TJFLAG_NOREALLOC,
            )
        };
        if status != 0 {
            // SAFETY: handle is live; this is the first native call after the failure
            let (code, message) = unsafe { self.turbo.failure(self.handle.as_ptr(), status) };
            return Err(TurboError::Encode { code, message });
        }

        let written = usize::try_from(out_size).unwrap_or(usize::MAX);
        if written > capacity {
            return Err(TurboError::Encode {
                code: -1,
                message: format!("encoder reported {written} bytes for a {capacity} byte buffer"),
            });
        }
        out.truncate(written);
        log::debug!(
            "compressed {}x{} {:?} to {} bytes",
            layout.width,
            layout.height,
            format,
            written
        );
        Ok(out)
    }
}

impl Drop for Compressor {
    fn drop(&mut self) {
        // SAFETY: handle is live and this is its only owner
        let status = unsafe { (self.turbo.api().destroy)(self.handle.as_ptr()) };
        if status != 0 {
            log::warn!("tjDestroy failed for compressor {:p}", self.handle);
        }
    }
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Compressor").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Compressor>();
    }
}
