use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::backend::desc::TextureFormat;
use crate::renderer::backend::vulkan::device::VulkanDevice;
use crate::renderer::backend::vulkan::instance::VulkanInstance;
use crate::renderer::backend::vulkan::translate;
use crate::renderer::core::Extent;

/// Swapchain images plus the index of the one currently acquired for rendering
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub present_mode: vk::PresentModeKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub image_extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub format: TextureFormat,

    requested_image_count: u32,
    acquire_fence: vk::Fence,
    acquired: Option<u32>,
}

impl Swapchain {
    pub fn new(
        ins: &VulkanInstance,
        dev: &VulkanDevice,
        extent: Extent,
        vsync: bool,
        requested_image_count: u32,
    ) -> Result<Self> {
        let (surface_format, format) = Self::select_surface_format(ins, dev)?;
        let supported_present_modes = unsafe {
            ins.surface_loader
                .get_physical_device_surface_present_modes(dev.physical, ins.surface)?
        };
        let present_mode = translate::present_mode(vsync, &supported_present_modes);

        let swapchain_loader = ash::khr::swapchain::Device::new(&ins.instance, &dev.logical);
        let acquire_fence = unsafe {
            dev.logical.create_fence(&vk::FenceCreateInfo::default(), None)?
        };

        let mut swapchain = Self {
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            present_mode,
            images: Vec::new(),
            image_views: Vec::new(),
            image_extent: vk::Extent2D::default(),
            surface_format,
            format,

            requested_image_count,
            acquire_fence,
            acquired: None,
        };
        let created = swapchain.recreate(ins, dev, extent);
        if !matches!(created, Ok(true)) {
            unsafe { swapchain.destroy(dev) };
            created?;
            return Err(eyre!("Surface has a zero-sized extent"));
        }

        log::info!(
            "Created swapchain: {} images of {:?}, {:?}",
            swapchain.images.len(),
            surface_format.format,
            present_mode,
        );
        Ok(swapchain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn is_released(&self) -> bool {
        self.image_views.is_empty()
    }

    /// Returns the acquired image index, acquiring one first if needed. `Ok(None)` means
    /// the swapchain no longer matches the surface and must be recreated.
    pub fn acquire(&mut self, dev: &VulkanDevice) -> Result<Option<u32>> {
        if let Some(index) = self.acquired {
            return Ok(Some(index));
        }

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        };
        let index = match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain is suboptimal for the surface");
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        // Rendering into the image may only start once the presentation engine let go of it
        unsafe {
            dev.logical.wait_for_fences(&[self.acquire_fence], true, u64::MAX)?;
            dev.logical.reset_fences(&[self.acquire_fence])?;
        }

        self.acquired = Some(index);
        Ok(Some(index))
    }

    /// Queues the acquired image for presentation. Returns false when the swapchain is out
    /// of date and has to be recreated before the next acquire.
    pub fn present(&mut self, queue: vk::Queue, wait_semaphores: &[vk::Semaphore]) -> Result<bool> {
        let index = self
            .acquired
            .take()
            .ok_or_else(|| eyre!("Present without an acquired swapchain image"))?;

        let swapchains = [self.swapchain];
        let image_indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(_) => Ok(true),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Destroys the image views. The images belong to the swapchain and stay counted until
    /// it is recreated.
    pub fn release(&mut self, dev: &VulkanDevice) {
        unsafe {
            for view in self.image_views.drain(..) {
                dev.logical.destroy_image_view(view, None);
            }
        }
        self.acquired = None;
    }

    /// Rebuilds the swapchain for `extent`, reusing the old one while the new one is created.
    /// Returns false without touching anything while the surface has no area.
    pub fn recreate(
        &mut self,
        ins: &VulkanInstance,
        dev: &VulkanDevice,
        extent: Extent,
    ) -> Result<bool> {
        let surface_capabilities = unsafe {
            ins.surface_loader
                .get_physical_device_surface_capabilities(dev.physical, ins.surface)?
        };

        let image_extent = {
            if surface_capabilities.current_extent.width != u32::MAX {
                surface_capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: extent.width.clamp(
                        surface_capabilities.min_image_extent.width,
                        surface_capabilities.max_image_extent.width,
                    ),
                    height: extent.height.clamp(
                        surface_capabilities.min_image_extent.height,
                        surface_capabilities.max_image_extent.height,
                    ),
                }
            }
        };
        if image_extent.width == 0 || image_extent.height == 0 {
            log::debug!("Surface has no area, keeping the old swapchain");
            return Ok(false);
        }
        self.release(dev);

        let min_image_count = {
            let min = surface_capabilities.min_image_count;
            let max = surface_capabilities.max_image_count;
            let requested = self.requested_image_count.max(min);
            if max > 0 { requested.min(max) } else { requested }
        };
        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };

        let old_swapchain = self.swapchain;
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(ins.surface)
            .min_image_count(min_image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(image_extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);

        self.swapchain = unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)?
        };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        self.images = unsafe {
            self.swapchain_loader.get_swapchain_images(self.swapchain)?
        };
        self.image_views = Self::create_image_views(&self.images, self.surface_format.format, dev)?;
        self.image_extent = image_extent;

        log::debug!(
            "Swapchain now {}x{} with {} images",
            image_extent.width,
            image_extent.height,
            self.images.len(),
        );
        Ok(true)
    }

    pub unsafe fn destroy(&mut self, dev: &VulkanDevice) {
        self.release(dev);
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            dev.logical.destroy_fence(self.acquire_fence, None);
        }
    }

    fn select_surface_format(
        ins: &VulkanInstance,
        dev: &VulkanDevice,
    ) -> Result<(vk::SurfaceFormatKHR, TextureFormat)> {
        let formats = unsafe {
            ins.surface_loader
                .get_physical_device_surface_formats(dev.physical, ins.surface)?
        };

        let preferred = [
            TextureFormat::Bgra8Unorm,
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba8UnormSrgb,
        ];
        let candidates = formats
            .iter()
            .filter(|format| format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .filter_map(|format| translate::surface_format(format.format).map(|known| (*format, known)))
            .collect::<Vec<_>>();
        preferred
            .into_iter()
            .find_map(|wanted| candidates.iter().find(|(_, known)| *known == wanted).copied())
            .ok_or_else(|| eyre!("Surface supports none of the 8-bit color formats: {:?}", formats))
    }

    fn create_image_views(
        images: &[vk::Image],
        format: vk::Format,
        dev: &VulkanDevice,
    ) -> Result<Vec<vk::ImageView>> {
        let views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    dev.logical.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok(views)
    }
}
