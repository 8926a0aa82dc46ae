use std::ffi::{c_char, c_int, c_uchar, c_ulong, c_void};

/// Opaque libturbojpeg handle (`tjhandle`)
pub type TjHandle = *mut c_void;

// TJFLAG_*
pub const TJFLAG_BOTTOMUP: c_int = 2;
pub const TJFLAG_FASTUPSAMPLE: c_int = 256;
pub const TJFLAG_NOREALLOC: c_int = 1024;
pub const TJFLAG_FASTDCT: c_int = 2048;
pub const TJFLAG_ACCURATEDCT: c_int = 4096;

// TJERR_*, returned by tjGetErrorCode
pub const TJERR_WARNING: c_int = 0;
pub const TJERR_FATAL: c_int = 1;

pub type InitDecompressFn = unsafe extern "C" fn() -> TjHandle;
pub type InitCompressFn = unsafe extern "C" fn() -> TjHandle;
pub type DestroyFn = unsafe extern "C" fn(handle: TjHandle) -> c_int;
pub type DecompressHeader2Fn = unsafe extern "C" fn(
    handle: TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    width: *mut c_int,
    height: *mut c_int,
    jpeg_subsamp: *mut c_int,
) -> c_int;
pub type Decompress2Fn = unsafe extern "C" fn(
    handle: TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    dst_buf: *mut c_uchar,
    width: c_int,
    pitch: c_int,
    height: c_int,
    pixel_format: c_int,
    flags: c_int,
) -> c_int;
pub type Compress2Fn = unsafe extern "C" fn(
    handle: TjHandle,
    src_buf: *const c_uchar,
    width: c_int,
    pitch: c_int,
    height: c_int,
    pixel_format: c_int,
    jpeg_buf: *mut *mut c_uchar,
    jpeg_size: *mut c_ulong,
    jpeg_subsamp: c_int,
    jpeg_qual: c_int,
    flags: c_int,
) -> c_int;
pub type BufSizeFn =
    unsafe extern "C" fn(width: c_int, height: c_int, jpeg_subsamp: c_int) -> c_ulong;
pub type GetErrorStrFn = unsafe extern "C" fn() -> *mut c_char;
pub type GetErrorStr2Fn = unsafe extern "C" fn(handle: TjHandle) -> *mut c_char;
pub type GetErrorCodeFn = unsafe extern "C" fn(handle: TjHandle) -> c_int;
pub type DecompressToYuvFn = unsafe extern "C" fn(
    handle: TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    dst_buf: *mut c_uchar,
    flags: c_int,
) -> c_int;
pub type BufSizeYuvFn =
    unsafe extern "C" fn(width: c_int, height: c_int, subsamp: c_int) -> c_ulong;
pub type GetScalingFactorsFn =
    unsafe extern "C" fn(num_scaling_factors: *mut c_int) -> *mut ScalingFactor;

/// `tjscalingfactor`: a decode scale of `num / denom`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingFactor {
    pub num: c_int,
    pub denom: c_int,
}

impl ScalingFactor {
    /// `dimension` scaled by this factor, rounded up
    pub fn scale(self, dimension: usize) -> usize {
        let (num, denom) = (self.num.max(0) as usize, self.denom.max(1) as usize);
        (dimension * num).div_ceil(denom)
    }
}

// Exported symbol names, NUL-terminated for libloading
pub const SYM_INIT_DECOMPRESS: &[u8] = b"tjInitDecompress\0";
pub const SYM_INIT_COMPRESS: &[u8] = b"tjInitCompress\0";
pub const SYM_DESTROY: &[u8] = b"tjDestroy\0";
pub const SYM_DECOMPRESS_HEADER2: &[u8] = b"tjDecompressHeader2\0";
pub const SYM_DECOMPRESS2: &[u8] = b"tjDecompress2\0";
pub const SYM_COMPRESS2: &[u8] = b"tjCompress2\0";
pub const SYM_BUF_SIZE: &[u8] = b"tjBufSize\0";
pub const SYM_GET_ERROR_STR: &[u8] = b"tjGetErrorStr\0";
// libjpeg-turbo >= 2.0
pub const SYM_GET_ERROR_STR2: &[u8] = b"tjGetErrorStr2\0";
pub const SYM_GET_ERROR_CODE: &[u8] = b"tjGetErrorCode\0";
// not required by decode or encode
pub const SYM_DECOMPRESS_TO_YUV: &[u8] = b"tjDecompressToYUV\0";
pub const SYM_BUF_SIZE_YUV: &[u8] = b"tjBufSizeYUV\0";
pub const SYM_GET_SCALING_FACTORS: &[u8] = b"tjGetScalingFactors\0";

/// Resolved libturbojpeg entry points.
///
/// The two per-handle error accessors are optional because libraries older
/// than 2.0 only export the global `tjGetErrorStr`. The planar YUV and scaling
/// entry points are optional too; a build without them still decodes.
#[derive(Debug, Clone, Copy)]
pub struct Api {
    pub init_decompress: InitDecompressFn,
    pub init_compress: InitCompressFn,
    pub destroy: DestroyFn,
    pub decompress_header2: DecompressHeader2Fn,
    pub decompress2: Decompress2Fn,
    pub compress2: Compress2Fn,
    pub buf_size: BufSizeFn,
    pub get_error_str: GetErrorStrFn,
    pub get_error_str2: Option<GetErrorStr2Fn>,
    pub get_error_code: Option<GetErrorCodeFn>,
    pub decompress_to_yuv: Option<DecompressToYuvFn>,
    pub buf_size_yuv: Option<BufSizeYuvFn>,
    pub get_scaling_factors: Option<GetScalingFactorsFn>,
}
