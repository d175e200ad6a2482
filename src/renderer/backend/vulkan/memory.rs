use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::backend::desc::{BufferUsage, TextureDesc};
use crate::renderer::backend::vulkan::translate;

/// Host-visible buffer that stays mapped until it is destroyed
pub struct VulkanBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub usage: BufferUsage,

    allocation: Option<Allocation>,
}

impl VulkanBuffer {
    pub fn new(
        size: u64,
        usage: BufferUsage,
        allocator: &mut Allocator,
        device: &ash::Device,
    ) -> Result<Self> {
        if size == 0 {
            return Err(eyre!("Zero-sized {:?} buffer", usage));
        }

        let buffer = {
            let buffer_info = vk::BufferCreateInfo {
                size,
                usage: translate::buffer_usage(usage),
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name: "Upload buffer",
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err.into());
            }
        };

        unsafe {
            device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )?;
        }

        Ok(Self {
            buffer,
            size,
            usage,

            allocation: Some(allocation),
        })
    }

    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<presser::CopyRecord> {
        let allocation = self
            .allocation
            .as_mut()
            .filter(|allocation| allocation.mapped_ptr().is_some())
            .ok_or_eyre("Upload buffer is not host mapped")?;
        copy_to_offset(allocation, self.size, offset, data)
    }

    pub unsafe fn destroy(&mut self, allocator: &mut Allocator, device: &ash::Device) -> Result<()> {
        if let Some(allocation) = self.allocation.take() {
            allocator.free(allocation)?;
        }
        unsafe {
            device.destroy_buffer(self.buffer, None);
        }
        Ok(())
    }
}

/// Copies `data` into the first `size` bytes of `slab` starting at `offset`
fn copy_to_offset<S: presser::Slab>(
    slab: &mut S,
    size: u64,
    offset: u64,
    data: &[u8],
) -> Result<presser::CopyRecord> {
    offset
        .checked_add(data.len() as u64)
        .filter(|end| *end <= size)
        .ok_or_else(|| eyre!(
            "Write of {} bytes at {} overflows buffer of {}",
            data.len(),
            offset,
            size,
        ))?;

    Ok(presser::copy_from_slice_to_offset(data, slab, offset as usize)?)
}

/// Device-local, shader-readable 2D texture
pub struct VulkanTexture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub desc: TextureDesc,

    allocation: Option<Allocation>,
}

impl VulkanTexture {
    // The image starts out in the undefined layout. The caller has to move it to
    // TRANSFER_DST_OPTIMAL before the first copy.
    pub fn new(
        desc: &TextureDesc,
        allocator: &mut Allocator,
        device: &ash::Device,
    ) -> Result<Self> {
        let format = translate::texture_format(desc.format);
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(format)
                .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
                .extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };
        let reqs = unsafe { device.get_image_memory_requirements(image) };
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name: "Texture",
            requirements: reqs,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::DedicatedImage(image),
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err.into());
            }
        };
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        let view = {
            let info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .image(image)
                .format(format)
                .subresource_range(color_subresource_range());
            unsafe { device.create_image_view(&info, None)? }
        };

        Ok(Self {
            image,
            view,
            desc: *desc,

            allocation: Some(allocation),
        })
    }

    pub unsafe fn destroy(&mut self, allocator: &mut Allocator, device: &ash::Device) -> Result<()> {
        unsafe {
            device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            allocator.free(allocation)?;
        }
        unsafe {
            device.destroy_image(self.image, None);
        }
        Ok(())
    }
}

pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}
