use std::ffi::{c_char, CStr};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::backend::vulkan::instance::VulkanInstance;
use crate::renderer::core::adapter::{AdapterInfo, AdapterKind};

/// Logical device with its single graphics queue, which also presents
pub struct VulkanDevice {
    pub logical: ash::Device,
    pub physical: vk::PhysicalDevice,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub properties: vk::PhysicalDeviceProperties,
    pub adapter: AdapterInfo,
}

impl VulkanDevice {
    pub fn new(instance: &VulkanInstance, kind: AdapterKind) -> Result<Self> {
        let (physical, queue_family_index) = Self::select_physical_device(instance, kind)?;
        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical)
        };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown device".to_string());

        let logical = Self::create_logical_device(&instance.instance, physical, queue_family_index)?;
        let queue = unsafe {
            logical.get_device_queue(queue_family_index, 0)
        };

        Ok(Self {
            logical,
            physical,
            queue,
            queue_family_index,
            properties,
            adapter: AdapterInfo {
                name,
                kind,
            },
        })
    }

    fn select_physical_device(
        instance: &VulkanInstance,
        kind: AdapterKind,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let vk_instance = &instance.instance;

        unsafe {
            vk_instance
                .enumerate_physical_devices()?
                .into_iter()
                // Software rasterizers only count as a fallback
                .filter(|device| {
                    let props = vk_instance.get_physical_device_properties(*device);
                    let is_software = props.device_type == vk::PhysicalDeviceType::CPU;
                    is_software == (kind == AdapterKind::Software)
                })
                .filter(|device| {
                    let props = vk_instance.get_physical_device_properties(*device);
                    props.api_version >= vk::API_VERSION_1_3
                })
                // Filter out devices that do not contain the required device extensions
                .filter(|device| {
                    let supported_extensions = vk_instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();

                    Self::get_required_device_extensions().iter().all(|req_ext| {
                        let req_ext_supported = supported_extensions
                            .iter()
                            .any(|sup_ext| sup_ext.extension_name_as_c_str().is_ok_and(|sup| sup == *req_ext));
                        if !req_ext_supported {
                            log::warn!("Device extension not supported: {:?}", req_ext);
                        }
                        req_ext_supported
                    })
                })
                .filter(|device| Self::supports_required_features(vk_instance, *device))
                // Filter out devices without a queue that can both draw and present
                .filter_map(|device| {
                    vk_instance
                        .get_physical_device_queue_family_properties(device)
                        .iter()
                        .enumerate()
                        .position(|(i, q)| {
                            let supports_graphics = q.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                            let supports_present = instance
                                .surface_loader
                                .get_physical_device_surface_support(device, i as u32, instance.surface)
                                .unwrap_or(false);
                            supports_graphics && supports_present
                        })
                        .map(|index| (device, index as u32))
                })
                .min_by_key(|(device, _)| {
                    let props = vk_instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        _ => 4,
                    }
                })
                .ok_or_else(|| eyre!("No suitable {:?} physical device found", kind))
        }
    }

    fn supports_required_features(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vulkan12_features)
            .push_next(&mut vulkan13_features);
        unsafe {
            instance.get_physical_device_features2(device, &mut features);
        }

        vulkan12_features.timeline_semaphore == vk::TRUE
            && vulkan13_features.dynamic_rendering == vk::TRUE
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family_index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features::default()
            .timeline_semaphore(true);
        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut vulkan12_features)
            .push_next(&mut vulkan13_features);

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };
        Ok(device)
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}
