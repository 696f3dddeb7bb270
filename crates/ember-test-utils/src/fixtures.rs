//! Fault-injecting buffer device.
//!
//! [`FaultyDevice`] hands out [`FaultyBuffer`]s backed by host memory. All
//! buffers of one device share a [`DeviceState`], through which a test can
//! arm one-shot failures and read resource counters, even after the device
//! has been moved into (and dropped with) a domain.

use std::cell::Cell;
use std::rc::Rc;

use ember_arena::{BufferDevice, BufferError, HostBuffer, ParticleBuffer};

/// Counters and armed faults shared by a device and its buffers.
#[derive(Debug, Default)]
pub struct DeviceState {
    fail_next_map: Cell<bool>,
    fail_next_reallocate: Cell<bool>,
    fail_next_create: Cell<bool>,
    live: Cell<usize>,
    created: Cell<usize>,
    released: Cell<usize>,
}

impl DeviceState {
    /// Make the next `map` on any buffer fail.
    pub fn fail_next_map(&self) {
        self.fail_next_map.set(true);
    }

    /// Make the next `reallocate` on any buffer fail.
    pub fn fail_next_reallocate(&self) {
        self.fail_next_reallocate.set(true);
    }

    /// Make the next `create_buffer` fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.set(true);
    }

    pub fn live_buffers(&self) -> usize {
        self.live.get()
    }

    pub fn created(&self) -> usize {
        self.created.get()
    }

    pub fn released(&self) -> usize {
        self.released.get()
    }
}

/// Buffer that fails on demand.
#[derive(Debug)]
pub struct FaultyBuffer {
    inner: HostBuffer,
    state: Rc<DeviceState>,
}

impl FaultyBuffer {
    pub fn as_slice(&self) -> &[f32] {
        self.inner.as_slice()
    }
}

impl ParticleBuffer for FaultyBuffer {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn write(&mut self, offset: usize, data: &[f32]) -> Result<(), BufferError> {
        self.inner.write(offset, data)
    }

    fn map(&mut self, len: usize) -> Result<&mut [f32], BufferError> {
        if self.state.fail_next_map.replace(false) {
            return Err(BufferError::MapFailed {
                reason: "injected fault".into(),
            });
        }
        self.inner.map(len)
    }

    fn reallocate(&mut self, capacity: usize, preserve: usize) -> Result<(), BufferError> {
        if self.state.fail_next_reallocate.replace(false) {
            return Err(BufferError::AllocationFailed {
                requested: capacity,
            });
        }
        self.inner.reallocate(capacity, preserve)
    }
}

/// Device producing [`FaultyBuffer`]s.
#[derive(Debug, Default)]
pub struct FaultyDevice {
    state: Rc<DeviceState>,
}

impl FaultyDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared state.
    pub fn state(&self) -> Rc<DeviceState> {
        Rc::clone(&self.state)
    }
}

impl BufferDevice for FaultyDevice {
    type Buffer = FaultyBuffer;

    fn create_buffer(&mut self, capacity: usize) -> Result<FaultyBuffer, BufferError> {
        if self.state.fail_next_create.replace(false) {
            return Err(BufferError::AllocationFailed {
                requested: capacity,
            });
        }
        self.state.live.set(self.state.live.get() + 1);
        self.state.created.set(self.state.created.get() + 1);
        Ok(FaultyBuffer {
            inner: HostBuffer::new(capacity),
            state: Rc::clone(&self.state),
        })
    }

    fn release_buffer(&mut self, buffer: FaultyBuffer) {
        self.state.live.set(self.state.live.get().saturating_sub(1));
        self.state.released.set(self.state.released.get() + 1);
        drop(buffer);
    }
}
