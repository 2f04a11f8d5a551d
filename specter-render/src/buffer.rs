//! Per-frame streaming GPU buffers.
//!
//! Uniform and debug-line data are rewritten every frame into growable
//! buffers. Callers size a buffer up front with [`StreamBuffer::ensure_capacity`],
//! then append with [`StreamBuffer::write`]; growth invalidates bind groups
//! that reference the buffer, which the generation counter tracks.

/// Initial buffer size (64KB)
const INITIAL_BUFFER_SIZE: u64 = 64 * 1024;

/// Growth factor when a buffer needs to expand (2x)
const BUFFER_GROWTH_FACTOR: u64 = 2;

/// Append-only GPU buffer that is reset at the start of each frame.
pub struct StreamBuffer {
    /// The wgpu buffer
    buffer: wgpu::Buffer,
    /// Buffer usage flags
    usage: wgpu::BufferUsages,
    /// Write cursor alignment in bytes (256 for dynamic uniform offsets)
    alignment: u64,
    /// Current capacity in bytes
    capacity: u64,
    /// Current used size in bytes
    used: u64,
    /// Bumped whenever the underlying buffer is recreated
    generation: u64,
    /// Debug label
    label: String,
}

impl StreamBuffer {
    pub fn new(
        device: &wgpu::Device,
        usage: wgpu::BufferUsages,
        alignment: u64,
        label: &str,
    ) -> Self {
        debug_assert!(alignment.is_power_of_two());
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: INITIAL_BUFFER_SIZE,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            usage,
            alignment,
            capacity: INITIAL_BUFFER_SIZE,
            used: 0,
            generation: 0,
            label: label.to_string(),
        }
    }

    /// Ensure the buffer can hold `required` bytes in total.
    ///
    /// Frame contents are not preserved across growth; call this before the
    /// frame's writes, not between them. Returns true if the buffer was
    /// recreated, in which case bind groups referencing it must be rebuilt.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, required: u64) -> bool {
        if required <= self.capacity {
            return false;
        }

        let mut new_capacity = self.capacity * BUFFER_GROWTH_FACTOR;
        while new_capacity < required {
            new_capacity *= BUFFER_GROWTH_FACTOR;
        }

        tracing::debug!(
            "Growing buffer '{}': {} -> {} bytes",
            self.label,
            self.capacity,
            new_capacity
        );

        self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&self.label),
            size: new_capacity,
            usage: self.usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.capacity = new_capacity;
        self.generation += 1;

        true
    }

    /// Append data at the next aligned offset and return that offset.
    ///
    /// Panics if the write does not fit (call `ensure_capacity` first).
    pub fn write(&mut self, queue: &wgpu::Queue, data: &[u8]) -> u64 {
        let offset = align_up(self.used, self.alignment);
        assert!(
            offset + data.len() as u64 <= self.capacity,
            "Buffer overflow in '{}': {} + {} > {}",
            self.label,
            offset,
            data.len(),
            self.capacity
        );

        queue.write_buffer(&self.buffer, offset, data);
        self.used = offset + data.len() as u64;

        offset
    }

    /// Reset the write cursor for a new frame.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
