/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything a Vulkan resource needs after creation:
/// - Instance, surface and device for Vulkan API calls
/// - Allocator for memory management
/// - Queues (graphics and present) behind one submission lock
/// - Command pool for one-shot operations (initial layouts, read-backs)
/// - Uploads waiting for the next command list to record them
/// - The pipeline layout shared by every pipeline
///
/// Every resource holds an `Arc<GpuContext>`, so the context is the last
/// Vulkan object to go away. Its `Drop` tears everything down in reverse
/// creation order: allocator, surface, debug messenger, device, instance.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use kerberos_engine::kerberos::{Error, Result, RendererConfig};
use kerberos_engine::kerberos::render::WindowHandleSource;
use kerberos_engine::{engine_err, engine_error, engine_info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard};

use crate::vulkan_format::uniform_descriptor_binding;
use crate::vulkan_upload::PendingUpload;

/// Log source for everything in this crate
pub(crate) const LOG_SOURCE: &str = "kerberos::vulkan";

/// Texture slots visible to shaders (set 0, bindings 0..MAX_TEXTURE_SLOTS)
const TEXTURE_SLOTS: u32 = kerberos_engine::kerberos::render::MAX_TEXTURE_SLOTS;
const UNIFORM_BINDINGS: u32 = kerberos_engine::kerberos::render::MAX_UNIFORM_BINDINGS;
const PUSH_CONSTANT_BYTES: u32 = kerberos_engine::kerberos::render::MAX_PUSH_CONSTANT_SIZE;

pub struct GpuContext {
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue: vk::Queue,
    pub(crate) present_queue_family: u32,
    /// Vulkan queues are externally synchronized
    queue_lock: Mutex<()>,

    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) push_descriptor: ash::khr::push_descriptor::Device,

    /// Reusable command pool for one-shot operations
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    upload_command_pool: Mutex<vk::CommandPool>,

    /// Staged writes not yet recorded into a command list
    pub(crate) pending_uploads: Mutex<Vec<PendingUpload>>,

    /// Sampler used for every texture slot
    pub(crate) sampler: vk::Sampler,
    /// Set 0: one push-descriptor combined image sampler per texture slot,
    /// then one uniform buffer per uniform binding
    pub(crate) descriptor_set_layout: vk::DescriptorSetLayout,
    /// Shared by every pipeline so push constants and descriptors survive pipeline switches
    pub(crate) pipeline_layout: vk::PipelineLayout,

    pub(crate) device_name: String,

    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    /// Create instance, surface, device and allocator for `window`
    pub fn new(window: &dyn WindowHandleSource, config: &RendererConfig) -> Result<Self> {
        let validation = cfg!(feature = "vulkan-validation") && config.validation_enabled();
        if config.validation_enabled() && !validation {
            engine_info!(
                LOG_SOURCE,
                "Validation requested but the vulkan-validation feature is disabled"
            );
        }

        unsafe {
            // Create Vulkan Entry
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = std::ffi::CString::new(config.app_name.as_str())
                .unwrap_or_else(|_| c"Kerberos Application".to_owned());
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Kerberos")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Get required extensions
            let display_handle = window.display_handle().map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();

            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            // From here on, a failure must destroy what was created so far
            let mut partial = PartialContext {
                instance: Some(&instance),
                debug: None,
                surface: None,
                device: None,
                command_pool: None,
                sampler: None,
                set_layout: None,
            };

            let (debug_utils_loader, debug_messenger) = if validation {
                let (loader, messenger) = Self::create_debug_messenger(&entry, &instance)?;
                partial.debug = Some((loader.clone(), messenger));
                (Some(loader), Some(messenger))
            } else {
                (None, None)
            };

            let window_handle = window.window_handle().map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to get window handle: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            partial.surface = Some((surface_loader.clone(), surface));

            let (physical_device, graphics_family_index, present_family_index) =
                Self::pick_physical_device(&instance, &surface_loader, surface)?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .ok()
                .and_then(|name| name.to_str().ok())
                .unwrap_or("Unknown GPU")
                .to_string();

            // Create Logical Device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];
            if present_family_index != graphics_family_index {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(present_family_index)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extension_names = [
                ash::khr::swapchain::NAME.as_ptr(),
                ash::khr::push_descriptor::NAME.as_ptr(),
            ];

            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .push_next(&mut vulkan13_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!(LOG_SOURCE, "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;
            partial.device = Some(device.clone());

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);
            let present_queue = device.get_device_queue(present_family_index, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create upload command pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e))
            })?;
            partial.command_pool = Some(upload_command_pool);

            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .max_lod(vk::LOD_CLAMP_NONE)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK);
            let sampler = device.create_sampler(&sampler_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create sampler: {:?}", e);
                Error::InitializationFailed(format!("Failed to create sampler: {:?}", e))
            })?;
            partial.sampler = Some(sampler);

            let textures = (0..TEXTURE_SLOTS).map(|slot| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            });
            let uniforms = (0..UNIFORM_BINDINGS).map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(uniform_descriptor_binding(binding))
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            });
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = textures.chain(uniforms).collect();
            let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default()
                .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
                .bindings(&bindings);
            let descriptor_set_layout = device.create_descriptor_set_layout(&set_layout_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create descriptor set layout: {:?}", e);
                Error::InitializationFailed(format!("Failed to create descriptor set layout: {:?}", e))
            })?;
            partial.set_layout = Some(descriptor_set_layout);

            let set_layouts = [descriptor_set_layout];
            let push_constant_ranges = [vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                .offset(0)
                .size(PUSH_CONSTANT_BYTES)];
            let layout_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&set_layouts)
                .push_constant_ranges(&push_constant_ranges);
            let pipeline_layout = device.create_pipeline_layout(&layout_info, None).map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to create pipeline layout: {:?}", e);
                Error::InitializationFailed(format!("Failed to create pipeline layout: {:?}", e))
            })?;

            partial.disarm();
            drop(partial);

            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let push_descriptor = ash::khr::push_descriptor::Device::new(&instance, &device);

            engine_info!(
                LOG_SOURCE,
                "Vulkan device '{}' ready (graphics family {}, present family {}, validation {})",
                device_name,
                graphics_family_index,
                present_family_index,
                if validation { "on" } else { "off" }
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_queue_family: graphics_family_index,
                present_queue,
                present_queue_family: present_family_index,
                queue_lock: Mutex::new(()),
                surface,
                surface_loader,
                swapchain_loader,
                push_descriptor,
                upload_command_pool: Mutex::new(upload_command_pool),
                pending_uploads: Mutex::new(Vec::new()),
                sampler,
                descriptor_set_layout,
                pipeline_layout,
                device_name,
                debug_utils_loader,
                debug_messenger,
            })
        }
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::reset_validation_stats();

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None).map_err(|e| {
            engine_error!(LOG_SOURCE, "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;
        Ok((debug_utils, messenger))
    }

    #[cfg(not(feature = "vulkan-validation"))]
    unsafe fn create_debug_messenger(
        _entry: &ash::Entry,
        _instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        Err(Error::InitializationFailed("validation support is not compiled in".to_string()))
    }

    /// First device with Vulkan 1.3, push descriptors, graphics and present support; discrete GPUs win
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32, u32)> {
        let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
            engine_error!(LOG_SOURCE, "Failed to enumerate physical devices: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?;

        let mut candidates = Vec::new();
        for physical_device in physical_devices {
            let properties = instance.get_physical_device_properties(physical_device);
            if properties.api_version < vk::API_VERSION_1_3 {
                continue;
            }

            let extensions = instance.enumerate_device_extension_properties(physical_device).unwrap_or_default();
            let has_extension = |name: &std::ffi::CStr| {
                extensions.iter().any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == name))
            };
            if !has_extension(ash::khr::swapchain::NAME) || !has_extension(ash::khr::push_descriptor::NAME) {
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let graphics = queue_families
                .iter()
                .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|i| i as u32);
            let supports_present = |i: u32| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, i, surface)
                    .unwrap_or(false)
            };
            // Prefer a single family doing both
            let present = match graphics {
                Some(g) if supports_present(g) => Some(g),
                _ => (0..queue_families.len() as u32).find(|&i| supports_present(i)),
            };

            if let (Some(graphics), Some(present)) = (graphics, present) {
                let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                candidates.push((discrete, physical_device, graphics, present));
            }
        }

        candidates.sort_by_key(|(discrete, ..)| !*discrete);
        candidates
            .into_iter()
            .next()
            .map(|(_, physical_device, graphics, present)| (physical_device, graphics, present))
            .ok_or_else(|| {
                engine_error!(LOG_SOURCE, "No Vulkan 1.3 GPU with push descriptors, graphics and present support found");
                Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
            })
    }

    /// Hold while submitting or presenting
    pub(crate) fn lock_queue(&self) -> Result<MutexGuard<'_, ()>> {
        self.queue_lock
            .lock()
            .map_err(|_| engine_err!(LOG_SOURCE, "Queue lock poisoned"))
    }

    /// Record, submit and wait for a one-shot command buffer on the graphics queue
    pub(crate) fn one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| engine_err!(LOG_SOURCE, "Upload command pool lock poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!(LOG_SOURCE, "Failed to allocate one-shot command buffer: {:?}", e))?[0];

            let result = (|| {
                let begin_info =
                    vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to begin one-shot command buffer: {:?}", e))?;

                record(&self.device, command_buffer);

                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to end one-shot command buffer: {:?}", e))?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
                let _queue = self.lock_queue()?;
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to submit one-shot commands: {:?}", e))?;
                self.device
                    .queue_wait_idle(self.graphics_queue)
                    .map_err(|e| engine_err!(LOG_SOURCE, "Failed to wait for one-shot commands: {:?}", e))
            })();

            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    /// Wait for every queue to drain
    pub(crate) fn wait_idle(&self) -> Result<()> {
        let _queue = self.lock_queue()?;
        unsafe {
            self.device.device_wait_idle().map_err(|e| {
                engine_error!(LOG_SOURCE, "Failed to wait for device idle: {:?}", e);
                Error::DeviceLost(format!("device_wait_idle failed: {:?}", e))
            })
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // Uploads that no command list picked up
            let pending = match self.pending_uploads.get_mut() {
                Ok(pending) => std::mem::take(pending),
                Err(poisoned) => std::mem::take(poisoned.into_inner()),
            };
            for upload in pending {
                upload.release(self);
            }

            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device.destroy_sampler(self.sampler, None);
            if let Ok(pool) = self.upload_command_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // Allocator must go before the device
            ManuallyDrop::drop(&mut self.allocator);

            self.surface_loader.destroy_surface(self.surface, None);

            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        engine_info!(LOG_SOURCE, "Vulkan context destroyed");
    }
}

/// Objects created during `GpuContext::new`, destroyed if construction bails out
#[derive(Default)]
struct PartialContext<'a> {
    instance: Option<&'a ash::Instance>,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(ash::khr::surface::Instance, vk::SurfaceKHR)>,
    device: Option<ash::Device>,
    command_pool: Option<vk::CommandPool>,
    sampler: Option<vk::Sampler>,
    set_layout: Option<vk::DescriptorSetLayout>,
}

impl PartialContext<'_> {
    /// Construction succeeded; ownership moves to the context
    fn disarm(&mut self) {
        self.instance = None;
    }
}

impl Drop for PartialContext<'_> {
    fn drop(&mut self) {
        let Some(instance) = self.instance else { return };
        unsafe {
            if let Some(device) = &self.device {
                if let Some(set_layout) = self.set_layout {
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                if let Some(sampler) = self.sampler {
                    device.destroy_sampler(sampler, None);
                }
                if let Some(pool) = self.command_pool {
                    device.destroy_command_pool(pool, None);
                }
                device.destroy_device(None);
            }
            if let Some((loader, surface)) = &self.surface {
                loader.destroy_surface(*surface, None);
            }
            if let Some((loader, messenger)) = &self.debug {
                loader.destroy_debug_utils_messenger(*messenger, None);
            }
            instance.destroy_instance(None);
        }
    }
}
