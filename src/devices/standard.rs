//! Standard Devices
//!
//! null, zero, full, random/urandom and tty, registered under their Linux
//! device numbers by [`DeviceRegistry::with_standard_devices`].

use std::io::{Read, Write};
use std::sync::Arc;

use rand::RngCore;

use super::types::{CharacterDevice, DeviceRegistry};
use crate::error::{DeviceError, Errno, FsResult};
use crate::fd::FileDescriptor;

/// (node name under `/dev`, major, minor) for each standard device.
pub const STANDARD_DEVICE_NODES: &[(&str, u32, u32)] = &[
    ("null", 1, 3),
    ("zero", 1, 5),
    ("full", 1, 7),
    ("random", 1, 8),
    ("urandom", 1, 9),
    ("tty", 5, 0),
];

/// Discards writes, reads as end-of-file.
pub struct NullDevice;

impl CharacterDevice for NullDevice {
    fn set_pos(&self, fd: &mut FileDescriptor, _pos: i64, _whence: u32) -> FsResult<()> {
        fd.set_position(0);
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, _buf: &mut [u8], _position: u64) -> FsResult<usize> {
        Ok(0)
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8], _position: u64, _extra: u32) -> FsResult<usize> {
        Ok(buf.len())
    }
}

/// Reads as an endless stream of zero bytes.
pub struct ZeroDevice;

impl CharacterDevice for ZeroDevice {
    fn set_pos(&self, fd: &mut FileDescriptor, _pos: i64, _whence: u32) -> FsResult<()> {
        fd.set_position(0);
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, buf: &mut [u8], _position: u64) -> FsResult<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8], _position: u64, _extra: u32) -> FsResult<usize> {
        Ok(buf.len())
    }
}

/// Like zero, but every write fails with ENOSPC.
pub struct FullDevice;

impl CharacterDevice for FullDevice {
    fn set_pos(&self, fd: &mut FileDescriptor, _pos: i64, _whence: u32) -> FsResult<()> {
        fd.set_position(0);
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, buf: &mut [u8], _position: u64) -> FsResult<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, _fd: &mut FileDescriptor, _buf: &[u8], _position: u64, _extra: u32) -> FsResult<usize> {
        Err(Errno::ENOSPC.into())
    }
}

/// Random bytes on read; writes are accepted and ignored.
pub struct RandomDevice;

impl CharacterDevice for RandomDevice {
    fn set_pos(&self, fd: &mut FileDescriptor, _pos: i64, _whence: u32) -> FsResult<()> {
        fd.set_position(0);
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, buf: &mut [u8], _position: u64) -> FsResult<usize> {
        rand::thread_rng().fill_bytes(buf);
        Ok(buf.len())
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8], _position: u64, _extra: u32) -> FsResult<usize> {
        Ok(buf.len())
    }
}

/// The controlling terminal: process stdin/stdout.
pub struct TtyDevice;

impl CharacterDevice for TtyDevice {
    fn set_pos(&self, _fd: &mut FileDescriptor, _pos: i64, _whence: u32) -> FsResult<()> {
        Err(Errno::ESPIPE.into())
    }

    fn read(&self, _fd: &mut FileDescriptor, buf: &mut [u8], _position: u64) -> FsResult<usize> {
        std::io::stdin().read(buf).map_err(|_| Errno::EIO.into())
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8], _position: u64, _extra: u32) -> FsResult<usize> {
        let mut out = std::io::stdout().lock();
        out.write_all(buf).and_then(|_| out.flush()).map_err(|_| Errno::EIO)?;
        Ok(buf.len())
    }
}

impl DeviceRegistry {
    /// A registry holding every device in [`STANDARD_DEVICE_NODES`].
    pub fn with_standard_devices() -> Result<Self, DeviceError> {
        let mut registry = DeviceRegistry::new();
        for &(name, major, minor) in STANDARD_DEVICE_NODES {
            let device: Arc<dyn CharacterDevice> = match name {
                "null" => Arc::new(NullDevice),
                "zero" => Arc::new(ZeroDevice),
                "full" => Arc::new(FullDevice),
                "random" | "urandom" => Arc::new(RandomDevice),
                _ => Arc::new(TtyDevice),
            };
            registry.register_chr(device, Some(major), Some(minor))?;
        }
        Ok(registry)
    }
}
