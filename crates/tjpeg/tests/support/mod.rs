#![allow(dead_code)]

//! In-process stand-in for libturbojpeg.
//!
//! Understands a tiny fake JPEG layout:
//! `FF D8 <width u16 be> <height u16 be> <subsampling u8> FF D9`.
//! Decoded row `y` is filled with the byte `y as u8`. Counters and the call
//! log are thread-local, so tests observe only their own native calls.

use std::{
    cell::{Cell, RefCell},
    ffi::{CString, c_char, c_int, c_uchar, c_ulong},
    sync::Arc,
};
use tjpeg::{PixelFormat, Subsampling, TurboJpeg, ffi};

pub const FAKE_JPEG_LEN: usize = 9;

thread_local! {
    static CALLS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static INITS: Cell<usize> = const { Cell::new(0) };
    static DESTROYS: Cell<usize> = const { Cell::new(0) };
    static DECOMPRESSES: Cell<usize> = const { Cell::new(0) };
    static FAIL_INIT: Cell<bool> = const { Cell::new(false) };
    static GLOBAL_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

struct StubHandle {
    error: CString,
    code: c_int,
}

pub fn fake_jpeg(width: u16, height: u16, subsampling: Subsampling) -> Vec<u8> {
    let [w0, w1] = width.to_be_bytes();
    let [h0, h1] = height.to_be_bytes();
    vec![0xFF, 0xD8, w0, w1, h0, h1, subsampling.code() as u8, 0xFF, 0xD9]
}

/// Stub library exporting only the pre-2.0 global error accessor.
pub fn stub_turbo() -> Arc<TurboJpeg> {
    reset();
    // SAFETY: the stub functions follow the turbojpeg.h contracts they are typed with
    unsafe { TurboJpeg::from_api(api(false), "stub") }
}

/// Stub library that also exports `tjGetErrorStr2` and `tjGetErrorCode`.
pub fn stub_turbo_with_handle_errors() -> Arc<TurboJpeg> {
    reset();
    // SAFETY: as above
    unsafe { TurboJpeg::from_api(api(true), "stub-2.x") }
}

/// Stub library without the YUV and scaling-factor entry points.
pub fn stub_turbo_without_yuv() -> Arc<TurboJpeg> {
    reset();
    let api = ffi::Api {
        decompress_to_yuv: None,
        buf_size_yuv: None,
        get_scaling_factors: None,
        ..api(false)
    };
    // SAFETY: as above
    unsafe { TurboJpeg::from_api(api, "stub-minimal") }
}

/// Scales reported by the stub's `tjGetScalingFactors`.
pub static SCALING_FACTORS: [ffi::ScalingFactor; 3] = [
    ffi::ScalingFactor { num: 1, denom: 1 },
    ffi::ScalingFactor { num: 1, denom: 2 },
    ffi::ScalingFactor { num: 1, denom: 8 },
];

/// Planar size the stub reports: one full-size plane for grayscale, three otherwise.
pub fn fake_yuv_len(width: usize, height: usize, subsampling: Subsampling) -> usize {
    match subsampling {
        Subsampling::Gray => width * height,
        _ => width * height * 3,
    }
}

fn api(handle_errors: bool) -> ffi::Api {
    ffi::Api {
        init_decompress: stub_init,
        init_compress: stub_init,
        destroy: stub_destroy,
        decompress_header2: stub_decompress_header2,
        decompress2: stub_decompress2,
        compress2: stub_compress2,
        buf_size: stub_buf_size,
        get_error_str: stub_get_error_str,
        get_error_str2: handle_errors.then_some(stub_get_error_str2 as ffi::GetErrorStr2Fn),
        get_error_code: handle_errors.then_some(stub_get_error_code as ffi::GetErrorCodeFn),
        decompress_to_yuv: Some(stub_decompress_to_yuv as ffi::DecompressToYuvFn),
        buf_size_yuv: Some(stub_buf_size_yuv as ffi::BufSizeYuvFn),
        get_scaling_factors: Some(stub_get_scaling_factors as ffi::GetScalingFactorsFn),
    }
}

/// Zero this thread's counters and call log.
pub fn reset() {
    CALLS.with(|calls| calls.borrow_mut().clear());
    for counter in [&INITS, &DESTROYS, &DECOMPRESSES] {
        counter.with(|n| n.set(0));
    }
    FAIL_INIT.with(|flag| flag.set(false));
}

pub fn calls() -> Vec<&'static str> {
    CALLS.with(|calls| calls.borrow().clone())
}

pub fn inits() -> usize {
    INITS.with(Cell::get)
}

pub fn destroys() -> usize {
    DESTROYS.with(Cell::get)
}

pub fn decompresses() -> usize {
    DECOMPRESSES.with(Cell::get)
}

pub fn set_fail_init(fail: bool) {
    FAIL_INIT.with(|flag| flag.set(fail));
}

fn record(call: &'static str) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

fn set_global_error(message: &str) {
    let message = CString::new(message).unwrap_or_default();
    GLOBAL_ERROR.with(|error| *error.borrow_mut() = message);
}

/// Stores `message` on the handle (when there is one) and globally; returns -1.
unsafe fn fail(handle: ffi::TjHandle, message: &str) -> c_int {
    set_global_error(message);
    if let Some(stub) = unsafe { (handle as *mut StubHandle).as_mut() } {
        stub.error = CString::new(message).unwrap_or_default();
        stub.code = ffi::TJERR_FATAL;
    }
    -1
}

struct FakeHeader {
    width: c_int,
    height: c_int,
    subsampling: c_int,
}

unsafe fn parse(jpeg_buf: *const c_uchar, jpeg_size: c_ulong) -> Result<FakeHeader, String> {
    if jpeg_buf.is_null() {
        return Err("Invalid argument".into());
    }
    let bytes = unsafe { std::slice::from_raw_parts(jpeg_buf, jpeg_size as usize) };
    match bytes {
        [0xFF, 0xD8, w0, w1, h0, h1, samp, 0xFF, 0xD9] => Ok(FakeHeader {
            width: c_int::from(u16::from_be_bytes([*w0, *w1])),
            height: c_int::from(u16::from_be_bytes([*h0, *h1])),
            subsampling: c_int::from(*samp),
        }),
        [first, second, ..] => Err(format!(
            "Not a JPEG file: starts with 0x{first:02x} 0x{second:02x}"
        )),
        _ => Err("Premature end of JPEG file".into()),
    }
}

unsafe extern "C" fn stub_init() -> ffi::TjHandle {
    record("tjInit");
    if FAIL_INIT.with(Cell::get) {
        set_global_error("Memory allocation failure");
        return std::ptr::null_mut();
    }
    INITS.with(|n| n.set(n.get() + 1));
    Box::into_raw(Box::new(StubHandle {
        error: CString::new("No error").unwrap_or_default(),
        code: ffi::TJERR_WARNING,
    })) as ffi::TjHandle
}

unsafe extern "C" fn stub_destroy(handle: ffi::TjHandle) -> c_int {
    record("tjDestroy");
    if handle.is_null() {
        return -1;
    }
    DESTROYS.with(|n| n.set(n.get() + 1));
    drop(unsafe { Box::from_raw(handle as *mut StubHandle) });
    0
}

unsafe extern "C" fn stub_decompress_header2(
    handle: ffi::TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    width: *mut c_int,
    height: *mut c_int,
    jpeg_subsamp: *mut c_int,
) -> c_int {
    record("tjDecompressHeader2");
    match unsafe { parse(jpeg_buf, jpeg_size) } {
        Ok(header) => unsafe {
            *width = header.width;
            *height = header.height;
            *jpeg_subsamp = header.subsampling;
            0
        },
        Err(message) => unsafe { fail(handle, &message) },
    }
}

unsafe extern "C" fn stub_decompress2(
    handle: ffi::TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    dst_buf: *mut c_uchar,
    width: c_int,
    pitch: c_int,
    height: c_int,
    pixel_format: c_int,
    _flags: c_int,
) -> c_int {
    record("tjDecompress2");
    DECOMPRESSES.with(|n| n.set(n.get() + 1));
    let header = match unsafe { parse(jpeg_buf, jpeg_size) } {
        Ok(header) => header,
        Err(message) => return unsafe { fail(handle, &message) },
    };
    let Some(format) = PixelFormat::from_code(pixel_format) else {
        return unsafe { fail(handle, "Invalid argument") };
    };
    if width != header.width || height != header.height {
        return unsafe { fail(handle, "Scaling is not supported by the stub") };
    }

    let row = width as usize * format.bytes_per_pixel();
    let pitch = if pitch == 0 { row } else { pitch as usize };
    if pitch < row || dst_buf.is_null() {
        return unsafe { fail(handle, "Invalid argument") };
    }
    for y in 0..height as usize {
        let dst = unsafe { std::slice::from_raw_parts_mut(dst_buf.add(y * pitch), row) };
        dst.fill(y as u8);
    }
    0
}

unsafe extern "C" fn stub_compress2(
    handle: ffi::TjHandle,
    _src_buf: *const c_uchar,
    width: c_int,
    _pitch: c_int,
    height: c_int,
    _pixel_format: c_int,
    jpeg_buf: *mut *mut c_uchar,
    jpeg_size: *mut c_ulong,
    jpeg_subsamp: c_int,
    _jpeg_qual: c_int,
    flags: c_int,
) -> c_int {
    record("tjCompress2");
    if flags & ffi::TJFLAG_NOREALLOC == 0 {
        return unsafe { fail(handle, "Stub cannot allocate output") };
    }
    let out = unsafe { *jpeg_buf };
    if out.is_null() || unsafe { *jpeg_size } < FAKE_JPEG_LEN as c_ulong {
        return unsafe { fail(handle, "Output buffer too small") };
    }
    let encoded = fake_jpeg(
        width as u16,
        height as u16,
        Subsampling::from_code(jpeg_subsamp),
    );
    unsafe {
        std::ptr::copy_nonoverlapping(encoded.as_ptr(), out, encoded.len());
        *jpeg_size = encoded.len() as c_ulong;
    }
    0
}

unsafe extern "C" fn stub_buf_size(width: c_int, height: c_int, jpeg_subsamp: c_int) -> c_ulong {
    record("tjBufSize");
    if width < 1 || height < 1 || !(0..=5).contains(&jpeg_subsamp) {
        set_global_error("tjBufSize(): Invalid argument");
        return c_ulong::MAX;
    }
    (width as c_ulong) * (height as c_ulong) * 4 + 2048
}

unsafe extern "C" fn stub_buf_size_yuv(width: c_int, height: c_int, subsamp: c_int) -> c_ulong {
    record("tjBufSizeYUV");
    if width < 1 || height < 1 || !(0..=5).contains(&subsamp) {
        set_global_error("tjBufSizeYUV(): Invalid argument");
        return c_ulong::MAX;
    }
    fake_yuv_len(
        width as usize,
        height as usize,
        Subsampling::from_code(subsamp),
    ) as c_ulong
}

/// Fills the Y plane with 0x10 and the chroma planes with 0x80.
unsafe extern "C" fn stub_decompress_to_yuv(
    handle: ffi::TjHandle,
    jpeg_buf: *const c_uchar,
    jpeg_size: c_ulong,
    dst_buf: *mut c_uchar,
    _flags: c_int,
) -> c_int {
    record("tjDecompressToYUV");
    DECOMPRESSES.with(|n| n.set(n.get() + 1));
    let header = match unsafe { parse(jpeg_buf, jpeg_size) } {
        Ok(header) => header,
        Err(message) => return unsafe { fail(handle, &message) },
    };
    if dst_buf.is_null() || !(0..=5).contains(&header.subsampling) {
        return unsafe { fail(handle, "Invalid argument") };
    }
    let luma = header.width as usize * header.height as usize;
    let len = fake_yuv_len(
        header.width as usize,
        header.height as usize,
        Subsampling::from_code(header.subsampling),
    );
    let planes = unsafe { std::slice::from_raw_parts_mut(dst_buf, len) };
    planes[..luma].fill(0x10);
    planes[luma..].fill(0x80);
    0
}

unsafe extern "C" fn stub_get_scaling_factors(
    num_scaling_factors: *mut c_int,
) -> *mut ffi::ScalingFactor {
    record("tjGetScalingFactors");
    unsafe { *num_scaling_factors = SCALING_FACTORS.len() as c_int };
    SCALING_FACTORS.as_ptr() as *mut ffi::ScalingFactor
}

unsafe extern "C" fn stub_get_error_str() -> *mut c_char {
    record("tjGetErrorStr");
    GLOBAL_ERROR.with(|error| error.borrow().as_ptr() as *mut c_char)
}

unsafe extern "C" fn stub_get_error_str2(handle: ffi::TjHandle) -> *mut c_char {
    record("tjGetErrorStr2");
    match unsafe { (handle as *mut StubHandle).as_ref() } {
        Some(stub) => stub.error.as_ptr() as *mut c_char,
        None => GLOBAL_ERROR.with(|error| error.borrow().as_ptr() as *mut c_char),
    }
}

unsafe extern "C" fn stub_get_error_code(handle: ffi::TjHandle) -> c_int {
    record("tjGetErrorCode");
    match unsafe { (handle as *mut StubHandle).as_ref() } {
        Some(stub) => stub.code,
        None => ffi::TJERR_FATAL,
    }
}
