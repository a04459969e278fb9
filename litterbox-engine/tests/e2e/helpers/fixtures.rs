//! Artifacts used across scenarios.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// A minimal PE32+ native-subsystem image (a kernel driver) without imports.
#[allow(dead_code)]
pub fn driver_image(marker: u8) -> Vec<u8> {
    const NT: usize = 0x40;
    const OPTIONAL: usize = 240;
    const ALIGN: usize = 0x200;

    fn put16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }
    fn put32(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    let mut buf = vec![0u8; ALIGN];
    buf[0..2].copy_from_slice(b"MZ");
    put32(&mut buf, 0x3C, NT as u32);
    buf[NT..NT + 4].copy_from_slice(b"PE\0\0");

    let fh = NT + 4;
    put16(&mut buf, fh, 0x8664);
    put16(&mut buf, fh + 2, 1);
    put16(&mut buf, fh + 16, OPTIONAL as u16);
    put16(&mut buf, fh + 18, 0x0002);

    let oh = fh + 20;
    put16(&mut buf, oh, 0x20b);
    put32(&mut buf, oh + 32, 0x1000);
    put32(&mut buf, oh + 36, ALIGN as u32);
    put32(&mut buf, oh + 56, 0x2000);
    put32(&mut buf, oh + 60, ALIGN as u32);
    // IMAGE_SUBSYSTEM_NATIVE
    put16(&mut buf, oh + 68, 1);
    put32(&mut buf, oh + 108, 16);

    let sh = oh + OPTIONAL;
    buf[sh..sh + 5].copy_from_slice(b".text");
    put32(&mut buf, sh + 8, 16);
    put32(&mut buf, sh + 12, 0x1000);
    put32(&mut buf, sh + 16, ALIGN as u32);
    put32(&mut buf, sh + 20, ALIGN as u32);
    put32(&mut buf, sh + 36, 0x6000_0020);

    buf.extend_from_slice(&[marker; 16]);
    buf.resize(2 * ALIGN, 0);
    buf
}

const CHECKSUM_AT: usize = 0x40 + 24 + 64;
const SECURITY_ENTRY_AT: usize = 0x40 + 24 + 112 + 32;

/// Attach `certificate` to an image from [`driver_image`] and restamp its
/// checksum, the way a signing tool would.
#[allow(dead_code)]
pub fn sign_image(image: &[u8], certificate: &[u8], checksum: u32) -> Vec<u8> {
    let mut signed = image.to_vec();
    let at = signed.len() as u32;
    signed.extend_from_slice(certificate);
    signed[SECURITY_ENTRY_AT..SECURITY_ENTRY_AT + 4].copy_from_slice(&at.to_le_bytes());
    signed[SECURITY_ENTRY_AT + 4..SECURITY_ENTRY_AT + 8]
        .copy_from_slice(&(certificate.len() as u32).to_le_bytes());
    signed[CHECKSUM_AT..CHECKSUM_AT + 4].copy_from_slice(&checksum.to_le_bytes());
    signed
}

/// Authenticode SHA-256 of an unsigned image from [`driver_image`].
#[allow(dead_code)]
pub fn unsigned_authentihash(image: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(&image[..CHECKSUM_AT]);
    hasher.update(&image[CHECKSUM_AT + 4..SECURITY_ENTRY_AT]);
    hasher.update(&image[SECURITY_ENTRY_AT + 8..]);
    hex::encode(hasher.finalize())
}

/// Mark a stored artifact executable so it can be launched as a payload.
#[allow(dead_code)]
pub fn make_executable(path: &Path) {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod payload");
}
