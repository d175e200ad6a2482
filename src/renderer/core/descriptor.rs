use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::backend::{DescriptorAddress, HeapHandle, HeapKind, RenderBackend};
use crate::renderer::backend::desc::DescriptorSource;

/// Fixed-capacity arena of descriptor slots.
///
/// The slot stride is queried from the backend once, when the heap is created. Every slot
/// address is computed by `address`, which is the only place doing `offset = index * stride`.
pub struct DescriptorHeap {
    handle: HeapHandle,
    kind: HeapKind,
    capacity: u32,
    stride: u64,
    occupied: Vec<bool>,
}

impl DescriptorHeap {
    pub fn new<B: RenderBackend>(backend: &mut B, kind: HeapKind, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(eyre!("Descriptor heap {:?} needs at least one slot", kind));
        }

        let stride = backend.descriptor_stride(kind);
        let handle = backend.create_descriptor_heap(kind, capacity)?;

        Ok(Self {
            handle,
            kind,
            capacity,
            stride,
            occupied: vec![false; capacity as usize],
        })
    }

    pub fn handle(&self) -> HeapHandle {
        self.handle
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn address(&self, index: u32) -> Result<DescriptorAddress> {
        if index >= self.capacity {
            return Err(eyre!(
                "Descriptor slot {} out of range for {:?} heap of capacity {}",
                index,
                self.kind,
                self.capacity,
            ));
        }

        Ok(DescriptorAddress {
            heap: self.handle,
            offset: index as u64 * self.stride,
        })
    }

    /// Writes a descriptor into slot `index` and returns its address
    pub fn write<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        index: u32,
        source: &DescriptorSource,
    ) -> Result<DescriptorAddress> {
        let address = self.address(index)?;
        backend.write_descriptor(address, source)?;
        self.occupied[index as usize] = true;
        Ok(address)
    }

    /// Marks every slot as stale, e.g. after the resources they describe were released
    pub fn invalidate_all(&mut self) {
        self.occupied.fill(false);
    }

    pub fn is_valid(&self, index: u32) -> bool {
        self.occupied.get(index as usize).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.occupied.iter().filter(|occupied| **occupied).count()
    }
}
