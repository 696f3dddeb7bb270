//! Buffer access protocol and the in-memory host implementation.
//!
//! A [`ParticleBuffer`] is one contiguous float region, typically a GPU
//! vertex buffer. The allocator touches it only through three operations:
//!
//! - [`write`](ParticleBuffer::write): sub-range upload at an offset.
//! - [`map`](ParticleBuffer::map): acquire a read/write view of a prefix.
//!   The view is released when the borrow ends.
//! - [`reallocate`](ParticleBuffer::reallocate): replace the storage with a
//!   new capacity, preserving a prefix.
//!
//! Each returns `Result`, so a lost context or failed map surfaces as a
//! [`BufferError`] instead of a null view.
//!
//! A [`BufferDevice`] creates and releases buffers. [`HostDevice`] backs
//! buffers with a `Vec<f32>` and counts live buffers, which is enough for
//! headless simulation and tests.

use crate::error::BufferError;

/// One contiguous float buffer.
pub trait ParticleBuffer {
    /// Capacity in floats.
    fn capacity(&self) -> usize;

    /// Upload `data` starting at float `offset`.
    fn write(&mut self, offset: usize, data: &[f32]) -> Result<(), BufferError>;

    /// Acquire a mutable view of floats `[0, len)`.
    fn map(&mut self, len: usize) -> Result<&mut [f32], BufferError>;

    /// Replace the storage with `capacity` floats, keeping `[0, preserve)`.
    ///
    /// Callers guarantee `preserve <= capacity` and
    /// `preserve <= self.capacity()`.
    fn reallocate(&mut self, capacity: usize, preserve: usize) -> Result<(), BufferError>;
}

/// Factory and owner of [`ParticleBuffer`]s.
pub trait BufferDevice {
    /// Buffer type produced by this device.
    type Buffer: ParticleBuffer;

    /// Create a zero-initialised buffer of `capacity` floats.
    fn create_buffer(&mut self, capacity: usize) -> Result<Self::Buffer, BufferError>;

    /// Release a buffer's storage.
    fn release_buffer(&mut self, buffer: Self::Buffer);
}

/// Host-memory buffer backed by a `Vec<f32>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostBuffer {
    data: Vec<f32>,
}

impl HostBuffer {
    /// Create a zero-initialised buffer of `capacity` floats.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
        }
    }

    /// The whole buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), BufferError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(BufferError::OutOfRange {
                offset,
                len,
                capacity: self.data.len(),
            }),
        }
    }
}

impl ParticleBuffer for HostBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, offset: usize, data: &[f32]) -> Result<(), BufferError> {
        self.check_range(offset, data.len())?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn map(&mut self, len: usize) -> Result<&mut [f32], BufferError> {
        self.check_range(0, len)?;
        Ok(&mut self.data[..len])
    }

    fn reallocate(&mut self, capacity: usize, preserve: usize) -> Result<(), BufferError> {
        self.check_range(0, preserve)?;
        if preserve > capacity {
            return Err(BufferError::OutOfRange {
                offset: 0,
                len: preserve,
                capacity,
            });
        }
        let mut data = vec![0.0; capacity];
        data[..preserve].copy_from_slice(&self.data[..preserve]);
        self.data = data;
        Ok(())
    }
}

/// Device handing out [`HostBuffer`]s.
#[derive(Debug, Default)]
pub struct HostDevice {
    live_buffers: usize,
    created: u64,
}

impl HostDevice {
    /// Create a device with no live buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers created and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    /// Total buffers ever created.
    pub fn created(&self) -> u64 {
        self.created
    }
}

impl BufferDevice for HostDevice {
    type Buffer = HostBuffer;

    fn create_buffer(&mut self, capacity: usize) -> Result<HostBuffer, BufferError> {
        self.live_buffers += 1;
        self.created += 1;
        Ok(HostBuffer::new(capacity))
    }

    fn release_buffer(&mut self, buffer: HostBuffer) {
        self.live_buffers = self.live_buffers.saturating_sub(1);
        drop(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buf = HostBuffer::new(16);
        assert_eq!(buf.capacity(), 16);
        assert!(buf.as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(buf.memory_bytes(), 64);
    }

    #[test]
    fn write_then_map_reads_back() {
        let mut buf = HostBuffer::new(8);
        buf.write(2, &[1.0, 2.0, 3.0]).unwrap();
        let view = buf.map(5).unwrap();
        assert_eq!(view, &[0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn write_past_end_is_out_of_range() {
        let mut buf = HostBuffer::new(4);
        let err = buf.write(3, &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            BufferError::OutOfRange {
                offset: 3,
                len: 2,
                capacity: 4
            }
        );
    }

    #[test]
    fn reallocate_preserves_prefix_only() {
        let mut buf = HostBuffer::new(4);
        buf.write(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        buf.reallocate(8, 2).unwrap();
        assert_eq!(buf.as_slice(), &[1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        buf.reallocate(2, 2).unwrap();
        assert_eq!(buf.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn reallocate_rejects_preserving_more_than_new_capacity() {
        let mut buf = HostBuffer::new(8);
        assert!(buf.reallocate(2, 4).is_err());
    }

    #[test]
    fn device_counts_live_buffers() {
        let mut device = HostDevice::new();
        let a = device.create_buffer(4).unwrap();
        let b = device.create_buffer(4).unwrap();
        assert_eq!(device.live_buffers(), 2);
        device.release_buffer(a);
        device.release_buffer(b);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.created(), 2);
    }
}
