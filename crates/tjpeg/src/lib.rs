pub mod compress;
pub mod decompressor;
pub mod error;
pub mod ffi;
pub mod jpeg;
pub mod library;
pub mod pixel;
pub mod pool;

pub use compress::Compressor;
pub use decompressor::{Decompressor, Header};
pub use error::{Result, TurboError};
pub use ffi::ScalingFactor;
pub use jpeg::{Jpeg, decode_file};
pub use library::{LIBRARY_ENV, TurboJpeg, default_candidates, ensure_loaded, library};
pub use pixel::{Flags, PixelFormat, Subsampling};
pub use pool::{DecompressorPool, PooledDecompressor};
pub use tjpeg_base::{Tensor, TensorError};

use library::LoadOnce;
use std::sync::Arc;

static POOL: LoadOnce<DecompressorPool> = LoadOnce::new();

/// The process-wide decompressor pool over [`library()`].
///
/// # Errors
/// `LibraryLoad` when libturbojpeg is not loaded yet and cannot be.
pub fn decompressor_pool() -> Result<Arc<DecompressorPool>> {
    POOL.get_or_try_load(|| Ok(DecompressorPool::new(library()?)))
}

/// Decode a JPEG held in memory using the process-wide pool.
pub fn decode(data: &[u8], format: PixelFormat) -> Result<Tensor<u8>> {
    Jpeg::from_bytes(&decompressor_pool()?, data).decode(format)
}

/// Read the header of a JPEG held in memory using the process-wide pool.
pub fn read_header(data: &[u8]) -> Result<Header> {
    Jpeg::from_bytes(&decompressor_pool()?, data).parse_header()
}
