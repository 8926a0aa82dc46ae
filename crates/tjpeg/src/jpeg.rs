use crate::{
    decompressor::Header,
    error::{Result, TurboError},
    pixel::{Flags, PixelFormat, destination_layout},
    pool::{DecompressorPool, PooledDecompressor},
};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::Arc,
};
use tjpeg_base::Tensor;

/// A decode session over one JPEG byte stream.
///
/// The stream is borrowed from the caller ([`Jpeg::from_bytes`]) or owned when
/// it was read from a file or handed over as a `Vec`. A decompressor is taken
/// from the pool on the first header parse or decode and held until
/// [`Jpeg::release`] or until the `Jpeg` is dropped, whichever comes first.
pub struct Jpeg<'a> {
    pool: Arc<DecompressorPool>,
    data: Cow<'a, [u8]>,
    decompressor: Option<PooledDecompressor>,
    header: Option<Header>,
}

impl Jpeg<'static> {
    /// Read a whole JPEG file into memory.
    ///
    /// # Errors
    /// `Io` when the file cannot be opened or read.
    pub fn from_file(pool: &Arc<DecompressorPool>, path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Ok(Self::from_vec(pool, data))
    }

    pub fn from_vec(pool: &Arc<DecompressorPool>, data: Vec<u8>) -> Self {
        Self::with_source(pool, Cow::Owned(data))
    }
}

impl<'a> Jpeg<'a> {
    /// Decode session over caller-owned bytes; nothing is copied.
    pub fn from_bytes(pool: &Arc<DecompressorPool>, data: &'a [u8]) -> Self {
        Self::with_source(pool, Cow::Borrowed(data))
    }

    fn with_source(pool: &Arc<DecompressorPool>, data: Cow<'a, [u8]>) -> Self {
        Jpeg {
            pool: Arc::clone(pool),
            data,
            decompressor: None,
            header: None,
        }
    }

    /// Whether the stream is borrowed rather than owned
    pub fn is_borrowed(&self) -> bool {
        matches!(self.data, Cow::Borrowed(_))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The header from the last successful [`Jpeg::parse_header`]
    pub fn header(&self) -> Option<Header> {
        self.header
    }

    /// Whether a pooled decompressor is currently held
    pub fn holds_decompressor(&self) -> bool {
        self.decompressor.is_some()
    }

    /// Parse the header, replacing any earlier result.
    ///
    /// On failure the previous header (if any) is kept, and so is the decompressor.
    pub fn parse_header(&mut self) -> Result<Header> {
        let decompressor = checkout(&self.pool, &mut self.decompressor)?;
        let header = decompressor.read_header(&self.data)?;
        self.header = Some(header);
        Ok(header)
    }

    /// Decode into a new buffer of shape `[height, width, bpp]`
    /// (`[height, width]` for grayscale).
    pub fn decode(&mut self, format: PixelFormat) -> Result<Tensor<u8>> {
        self.decode_with(format, Flags::NONE)
    }

    pub fn decode_with(&mut self, format: PixelFormat, flags: Flags) -> Result<Tensor<u8>> {
        let header = self.ensure_header()?;
        let mut image = Tensor::zeros(format.shape(header.width, header.height))?;
        self.decompress_into(&header, &mut image, format, flags)?;
        Ok(image)
    }

    /// Decode into a caller-supplied buffer.
    ///
    /// `dst` must be `[h, w, bpp]` (or `[h, w]` for grayscale) with `h` and `w`
    /// at least the image's size; its row pitch is `w * bpp`. A buffer that does
    /// not fit is rejected before the decoder runs.
    pub fn decode_into(&mut self, dst: &mut Tensor<u8>, format: PixelFormat) -> Result<()> {
        self.decode_into_with(dst, format, Flags::NONE)
    }

    pub fn decode_into_with(
        &mut self,
        dst: &mut Tensor<u8>,
        format: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        let header = self.ensure_header()?;
        self.decompress_into(&header, dst, format, flags)
    }

    /// Decode to planar YUV at the image's own subsampling.
    ///
    /// See [`crate::Decompressor::decompress_to_yuv`] for the plane layout.
    pub fn decode_yuv(&mut self) -> Result<Vec<u8>> {
        self.decode_yuv_with(Flags::NONE)
    }

    pub fn decode_yuv_with(&mut self, flags: Flags) -> Result<Vec<u8>> {
        let header = self.ensure_header()?;
        let decompressor = checkout(&self.pool, &mut self.decompressor)?;
        decompressor.decompress_to_yuv(&self.data, &header, flags)
    }

    /// Return the held decompressor to the pool now. Later calls take another one.
    pub fn release(&mut self) {
        if let Some(decompressor) = self.decompressor.take() {
            decompressor.release();
        }
    }

    fn ensure_header(&mut self) -> Result<Header> {
        match self.header {
            Some(header) => Ok(header),
            None => self.parse_header(),
        }
    }

    fn decompress_into(
        &mut self,
        header: &Header,
        dst: &mut Tensor<u8>,
        format: PixelFormat,
        flags: Flags,
    ) -> Result<()> {
        let layout = destination_layout(
            &dst.shape,
            dst.data.len(),
            format,
            header.width,
            header.height,
        )?;
        let decompressor = checkout(&self.pool, &mut self.decompressor)?;
        decompressor.decompress(&self.data, header, &mut dst.data, layout, format, flags)
    }
}

impl std::fmt::Debug for Jpeg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jpeg")
            .field("len", &self.data.len())
            .field("header", &self.header)
            .field("holds_decompressor", &self.holds_decompressor())
            .finish()
    }
}

fn checkout<'a>(
    pool: &Arc<DecompressorPool>,
    slot: &'a mut Option<PooledDecompressor>,
) -> Result<&'a mut PooledDecompressor> {
    let decompressor = match slot.take() {
        Some(decompressor) => decompressor,
        None => pool.acquire()?,
    };
    Ok(slot.insert(decompressor))
}

/// Read and decode a JPEG file on tokio's blocking thread pool.
///
/// The native decode cannot be interrupted; dropping the returned future only
/// stops waiting for it.
pub async fn decode_file(
    pool: Arc<DecompressorPool>,
    path: impl Into<PathBuf>,
    format: PixelFormat,
) -> Result<Tensor<u8>> {
    let path = path.into();
    tokio::task::spawn_blocking(move || {
        let mut jpeg = Jpeg::from_file(&pool, &path)?;
        jpeg.decode(format)
    })
    .await
    .map_err(|e| TurboError::Task(e.to_string()))?
}
