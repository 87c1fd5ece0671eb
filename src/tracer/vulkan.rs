use std::ffi::CStr;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::path::PathBuf;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;

use super::{compact_events, TraceConfig};
use crate::beamline::Beamline;
use crate::element::record::ELEMENT_WIRE_SIZE;
use crate::kernel::Sequential;
use crate::rays::{EventType, Ray, Rays, RAY_WIRE_SIZE};
use crate::{Error, Result};

/// One compute lane per ray.
const WORKGROUP_SIZE: u32 = 32;

/// Upper bound for the host-visible staging buffer; transfers above this
/// size are chunked.
const MAX_STAGING_SIZE: u64 = 128 * 1024 * 1024;

const FENCE_TIMEOUT_NS: u64 = 1_000_000_000_000;

/// Parameters handed to the compute kernel once per dispatch.
#[repr(C)]
struct DispatchParams {
	ray_count: u32,
	element_count: u32,
	max_bounces: u32,
	sequential: u32,
	seed_lo: u32,
	seed_hi: u32,
	max_events: u32,
	_pad: u32,
}

struct DeviceBuffer {
	buffer: vk::Buffer,
	allocation: Option<Allocation>,
	size: u64,
}

/// Traces on a Vulkan compute queue. Ray input and event output move
/// through a bounded staging buffer in chunks; elements, material tables
/// and dispatch parameters are uploaded once per trace.
pub struct VulkanTracer {
	entry: ash::Entry,
	instance: ash::Instance,
	physical_device: vk::PhysicalDevice,
	device: ash::Device,
	queue: vk::Queue,
	queue_family_index: u32,
	command_pool: vk::CommandPool,
	allocator: ManuallyDrop<Allocator>,
}

fn cache_path() -> PathBuf {
	std::env::temp_dir().join("pipeline_cache.data")
}

fn shader_path() -> PathBuf {
	std::env::var_os("BEAMTRACE_SHADER")
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("shaders/trace.spv"))
}

fn device_err<E: std::fmt::Display>(e: E) -> Error {
	Error::Device(e.to_string())
}

impl VulkanTracer {
	pub fn new() -> Result<Self> {
		unsafe {
			let entry = ash::Entry::load().map_err(device_err)?;

			let app_info = vk::ApplicationInfo::builder()
				.application_name(CStr::from_bytes_with_nul_unchecked(b"beamtrace\0"))
				.api_version(vk::API_VERSION_1_1);
			let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
			let instance = entry.create_instance(&create_info, None).map_err(device_err)?;

			let (physical_device, queue_family_index) = pick_physical_device(&instance)?;

			let properties = instance.get_physical_device_properties(physical_device);
			let name = CStr::from_ptr(properties.device_name.as_ptr());
			log::debug!("tracing on {:?}", name);

			let queue_priorities = [1.0f32];
			let queue_info = vk::DeviceQueueCreateInfo::builder()
				.queue_family_index(queue_family_index)
				.queue_priorities(&queue_priorities);
			let queue_infos = [queue_info.build()];

			let features = vk::PhysicalDeviceFeatures::builder().shader_float64(true);
			let device_info = vk::DeviceCreateInfo::builder()
				.queue_create_infos(&queue_infos)
				.enabled_features(&features);
			let device = instance
				.create_device(physical_device, &device_info, None)
				.map_err(device_err)?;

			let queue = device.get_device_queue(queue_family_index, 0);

			let pool_info = vk::CommandPoolCreateInfo::builder()
				.queue_family_index(queue_family_index)
				.flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
			let command_pool = device.create_command_pool(&pool_info, None).map_err(device_err)?;

			let allocator = Allocator::new(&AllocatorCreateDesc {
				instance: instance.clone(),
				device: device.clone(),
				physical_device,
				debug_settings: Default::default(),
				buffer_device_address: false,
				allocation_sizes: Default::default(),
			})
			.map_err(device_err)?;

			Ok(Self {
				entry,
				instance,
				physical_device,
				device,
				queue,
				queue_family_index,
				command_pool,
				allocator: ManuallyDrop::new(allocator),
			})
		}
	}

	pub fn trace(&mut self, beamline: &Beamline, config: &TraceConfig) -> Result<Rays> {
		let seed = config.resolved_seed();

		let elements = beamline.compile_elements()?;
		let materials = beamline.calc_minimal_material_tables()?;
		let input = beamline.compile_sources(config.thread_count, seed)?;

		let num_sources = beamline.num_sources();
		let ray_count = input.len();
		if ray_count == 0 {
			return Ok(compact_events(Vec::new(), num_sources, elements.len(), config));
		}

		// Flat little-endian images of everything the kernel reads.
		let mut ray_data = vec![0u8; ray_count * RAY_WIRE_SIZE];
		for (i, ray) in input.iter().enumerate() {
			ray.write_wire(&mut ray_data[i * RAY_WIRE_SIZE..(i + 1) * RAY_WIRE_SIZE]);
		}

		let mut element_data = vec![0u8; elements.len().max(1) * ELEMENT_WIRE_SIZE];
		for (i, element) in elements.iter().enumerate() {
			element.write_wire(&mut element_data[i * ELEMENT_WIRE_SIZE..(i + 1) * ELEMENT_WIRE_SIZE]);
		}

		let mut material_data = Vec::with_capacity(92 * 4 + materials.material_table.len() * 8);
		for offset in &materials.index_table {
			material_data.extend_from_slice(&offset.to_le_bytes());
		}
		for value in &materials.material_table {
			material_data.extend_from_slice(&value.to_le_bytes());
		}
		let output_size = (ray_count * config.max_events * RAY_WIRE_SIZE) as u64;

		let params = DispatchParams {
			ray_count: ray_count as u32,
			element_count: elements.len() as u32,
			max_bounces: config.max_bounces,
			sequential: match config.sequential {
				Sequential::No => 0,
				Sequential::Yes => 1,
			},
			seed_lo: seed as u32,
			seed_hi: (seed >> 32) as u32,
			max_events: config.max_events as u32,
			_pad: 0,
		};

		unsafe {
			let mut ray_buffer = self.create_buffer(ray_data.len() as u64, MemoryLocation::GpuOnly)?;
			let mut output_buffer = self.create_buffer(output_size, MemoryLocation::GpuOnly)?;
			let mut element_buffer = self.create_buffer(element_data.len() as u64, MemoryLocation::GpuOnly)?;
			let mut material_buffer = self.create_buffer(material_data.len() as u64, MemoryLocation::GpuOnly)?;

			let staging_size = MAX_STAGING_SIZE
				.min((ray_data.len() as u64).max(output_size).max(element_data.len() as u64));
			let mut staging = self.create_buffer(staging_size, MemoryLocation::CpuToGpu)?;

			let result = self.run_dispatch(
				&params,
				&ray_data,
				&element_data,
				&material_data,
				&mut ray_buffer,
				&mut output_buffer,
				&mut element_buffer,
				&mut material_buffer,
				&mut staging,
				ray_count,
			);

			self.destroy_buffer(ray_buffer);
			self.destroy_buffer(element_buffer);
			self.destroy_buffer(material_buffer);
			let events = match result {
				Ok(()) => self.read_back_events(&output_buffer, &mut staging, ray_count, config.max_events, &input),
				Err(e) => Err(e),
			};
			self.destroy_buffer(output_buffer);
			self.destroy_buffer(staging);

			let per_ray = events?;
			Ok(compact_events(per_ray, num_sources, elements.len(), config))
		}
	}

	#[allow(clippy::too_many_arguments)]
	unsafe fn run_dispatch(
		&mut self,
		params: &DispatchParams,
		ray_data: &[u8],
		element_data: &[u8],
		material_data: &[u8],
		ray_buffer: &mut DeviceBuffer,
		output_buffer: &mut DeviceBuffer,
		element_buffer: &mut DeviceBuffer,
		material_buffer: &mut DeviceBuffer,
		staging: &mut DeviceBuffer,
		ray_count: usize,
	) -> Result<()> {
		self.upload_chunked(staging, ray_buffer, ray_data)?;
		self.upload_chunked(staging, element_buffer, element_data)?;
		self.upload_chunked(staging, material_buffer, material_data)?;

		// Pipeline setup, with the cache blob from a previous run.
		let shader = self.load_shader_module()?;
		let pipeline_cache = self.create_pipeline_cache();

		let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..4)
			.map(|binding| {
				vk::DescriptorSetLayoutBinding::builder()
					.binding(binding)
					.descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
					.descriptor_count(1)
					.stage_flags(vk::ShaderStageFlags::COMPUTE)
					.build()
			})
			.collect();
		let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
		let set_layout = self
			.device
			.create_descriptor_set_layout(&layout_info, None)
			.map_err(device_err)?;

		let push_range = vk::PushConstantRange::builder()
			.stage_flags(vk::ShaderStageFlags::COMPUTE)
			.offset(0)
			.size(std::mem::size_of::<DispatchParams>() as u32);
		let set_layouts = [set_layout];
		let push_ranges = [push_range.build()];
		let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder()
			.set_layouts(&set_layouts)
			.push_constant_ranges(&push_ranges);
		let pipeline_layout = self
			.device
			.create_pipeline_layout(&pipeline_layout_info, None)
			.map_err(device_err)?;

		let stage = vk::PipelineShaderStageCreateInfo::builder()
			.stage(vk::ShaderStageFlags::COMPUTE)
			.module(shader)
			.name(CStr::from_bytes_with_nul_unchecked(b"main\0"));
		let pipeline_info = vk::ComputePipelineCreateInfo::builder()
			.stage(stage.build())
			.layout(pipeline_layout);
		let pipeline = self
			.device
			.create_compute_pipelines(pipeline_cache, &[pipeline_info.build()], None)
			.map_err(|(_, e)| device_err(e))?[0];

		self.persist_pipeline_cache(pipeline_cache);

		// Descriptors for the four storage buffers.
		let pool_sizes = [vk::DescriptorPoolSize {
			ty: vk::DescriptorType::STORAGE_BUFFER,
			descriptor_count: 4,
		}];
		let pool_info = vk::DescriptorPoolCreateInfo::builder()
			.max_sets(1)
			.pool_sizes(&pool_sizes);
		let descriptor_pool = self
			.device
			.create_descriptor_pool(&pool_info, None)
			.map_err(device_err)?;

		let alloc_info = vk::DescriptorSetAllocateInfo::builder()
			.descriptor_pool(descriptor_pool)
			.set_layouts(&set_layouts);
		let descriptor_set = self.device.allocate_descriptor_sets(&alloc_info).map_err(device_err)?[0];

		let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = [ray_buffer, output_buffer, element_buffer, material_buffer]
			.iter()
			.map(|b| {
				[vk::DescriptorBufferInfo {
					buffer: b.buffer,
					offset: 0,
					range: vk::WHOLE_SIZE,
				}]
			})
			.collect();
		let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
			.iter()
			.enumerate()
			.map(|(binding, info)| {
				vk::WriteDescriptorSet::builder()
					.dst_set(descriptor_set)
					.dst_binding(binding as u32)
					.descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
					.buffer_info(info)
					.build()
			})
			.collect();
		self.device.update_descriptor_sets(&writes, &[]);

		// Record and submit the dispatch, one fence to wait on.
		let cmd = self.begin_commands()?;
		self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
		self.device.cmd_bind_descriptor_sets(
			cmd,
			vk::PipelineBindPoint::COMPUTE,
			pipeline_layout,
			0,
			&[descriptor_set],
			&[],
		);
		let param_bytes = std::slice::from_raw_parts(
			params as *const DispatchParams as *const u8,
			std::mem::size_of::<DispatchParams>(),
		);
		self.device
			.cmd_push_constants(cmd, pipeline_layout, vk::ShaderStageFlags::COMPUTE, 0, param_bytes);

		let group_count = (ray_count as u32).div_ceil(WORKGROUP_SIZE);
		log::debug!("dispatching {group_count} workgroups of {WORKGROUP_SIZE} for {ray_count} rays");
		self.device.cmd_dispatch(cmd, group_count, 1, 1);

		let submit_result = self.submit_and_wait(cmd);

		// The pipeline objects are not reused across traces.
		self.device.destroy_descriptor_pool(descriptor_pool, None);
		self.device.destroy_pipeline(pipeline, None);
		self.device.destroy_pipeline_layout(pipeline_layout, None);
		self.device.destroy_descriptor_set_layout(set_layout, None);
		self.device.destroy_pipeline_cache(pipeline_cache, None);
		self.device.destroy_shader_module(shader, None);

		submit_result
	}

	unsafe fn create_buffer(&mut self, size: u64, location: MemoryLocation) -> Result<DeviceBuffer> {
		let size = size.max(4);
		let info = vk::BufferCreateInfo::builder()
			.size(size)
			.usage(
				vk::BufferUsageFlags::STORAGE_BUFFER
					| vk::BufferUsageFlags::TRANSFER_SRC
					| vk::BufferUsageFlags::TRANSFER_DST,
			)
			.sharing_mode(vk::SharingMode::EXCLUSIVE);
		let buffer = self.device.create_buffer(&info, None).map_err(device_err)?;

		let requirements = self.device.get_buffer_memory_requirements(buffer);
		let allocation = self
			.allocator
			.allocate(&AllocationCreateDesc {
				name: "beamtrace buffer",
				requirements,
				location,
				linear: true,
				allocation_scheme: AllocationScheme::GpuAllocatorManaged,
			})
			.map_err(device_err)?;
		self.device
			.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
			.map_err(device_err)?;

		Ok(DeviceBuffer { buffer, allocation: Some(allocation), size })
	}

	unsafe fn destroy_buffer(&mut self, mut buffer: DeviceBuffer) {
		if let Some(allocation) = buffer.allocation.take() {
			let _ = self.allocator.free(allocation);
		}
		self.device.destroy_buffer(buffer.buffer, None);
	}

	/// Copies host data into a device-local buffer through the staging
	/// buffer, `staging.size` bytes at a time.
	unsafe fn upload_chunked(&mut self, staging: &mut DeviceBuffer, dst: &mut DeviceBuffer, data: &[u8]) -> Result<()> {
		let chunk_size = staging.size as usize;
		let chunks = data.len().div_ceil(chunk_size.max(1));
		log::debug!("uploading {} bytes in {chunks} staging chunks", data.len());

		for (index, chunk) in data.chunks(chunk_size).enumerate() {
			let mapped = staging
				.allocation
				.as_ref()
				.and_then(|a| a.mapped_ptr())
				.ok_or_else(|| Error::Device("staging buffer is not host visible".into()))?;
			std::ptr::copy_nonoverlapping(chunk.as_ptr(), mapped.as_ptr() as *mut u8, chunk.len());

			let cmd = self.begin_commands()?;
			self.device.cmd_copy_buffer(
				cmd,
				staging.buffer,
				dst.buffer,
				&[vk::BufferCopy {
					src_offset: 0,
					dst_offset: (index * chunk_size) as u64,
					size: chunk.len() as u64,
				}],
			);
			self.submit_and_wait(cmd)?;
		}
		Ok(())
	}

	/// Reads the raw event buffer back in staging-sized chunks and cuts
	/// it into per-ray event lists.
	unsafe fn read_back_events(
		&mut self,
		output: &DeviceBuffer,
		staging: &mut DeviceBuffer,
		ray_count: usize,
		max_events: usize,
		input: &[Ray],
	) -> Result<Vec<Vec<Ray>>> {
		let total = ray_count * max_events * RAY_WIRE_SIZE;
		let chunk_size = staging.size as usize;
		let mut raw = vec![0u8; total];

		let mut offset = 0usize;
		while offset < total {
			let len = chunk_size.min(total - offset);

			let cmd = self.begin_commands()?;
			self.device.cmd_copy_buffer(
				cmd,
				output.buffer,
				staging.buffer,
				&[vk::BufferCopy {
					src_offset: offset as u64,
					dst_offset: 0,
					size: len as u64,
				}],
			);
			self.submit_and_wait(cmd)?;

			let mapped = staging
				.allocation
				.as_ref()
				.and_then(|a| a.mapped_ptr())
				.ok_or_else(|| Error::Device("staging buffer is not host visible".into()))?;
			std::ptr::copy_nonoverlapping(mapped.as_ptr() as *const u8, raw[offset..].as_mut_ptr(), len);

			offset += len;
		}

		// Slot k of the buffer belongs to path k; unused slots carry the
		// uninitialized tag.
		let mut per_ray = Vec::with_capacity(ray_count);
		for path in 0..ray_count {
			let mut events = Vec::new();
			for slot in 0..max_events {
				let at = (path * max_events + slot) * RAY_WIRE_SIZE;
				let mut event = Ray::read_wire(&raw[at..at + RAY_WIRE_SIZE]);
				if event.event_type == EventType::Uninit {
					break;
				}
				event.path_id = input[path].path_id;
				event.path_event_id = slot as i32;
				event.source_id = input[path].source_id;
				events.push(event);
			}
			per_ray.push(events);
		}
		Ok(per_ray)
	}

	unsafe fn begin_commands(&self) -> Result<vk::CommandBuffer> {
		let alloc_info = vk::CommandBufferAllocateInfo::builder()
			.command_pool(self.command_pool)
			.level(vk::CommandBufferLevel::PRIMARY)
			.command_buffer_count(1);
		let cmd = self.device.allocate_command_buffers(&alloc_info).map_err(device_err)?[0];

		let begin_info = vk::CommandBufferBeginInfo::builder()
			.flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
		self.device.begin_command_buffer(cmd, &begin_info).map_err(device_err)?;
		Ok(cmd)
	}

	/// Submits one command buffer and blocks on its fence.
	unsafe fn submit_and_wait(&self, cmd: vk::CommandBuffer) -> Result<()> {
		self.device.end_command_buffer(cmd).map_err(device_err)?;

		let fence_info = vk::FenceCreateInfo::builder();
		let fence = self.device.create_fence(&fence_info, None).map_err(device_err)?;

		let cmds = [cmd];
		let submit = vk::SubmitInfo::builder().command_buffers(&cmds);
		let result = self
			.device
			.queue_submit(self.queue, &[submit.build()], fence)
			.map_err(device_err)
			.and_then(|()| {
				self.device
					.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS)
					.map_err(device_err)
			});

		self.device.destroy_fence(fence, None);
		self.device.free_command_buffers(self.command_pool, &cmds);
		result
	}

	unsafe fn load_shader_module(&self) -> Result<vk::ShaderModule> {
		let path = shader_path();
		let bytes = std::fs::read(&path)
			.map_err(|e| Error::Device(format!("cannot read compute kernel {}: {e}", path.display())))?;
		let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes)).map_err(device_err)?;

		let info = vk::ShaderModuleCreateInfo::builder().code(&code);
		self.device.create_shader_module(&info, None).map_err(device_err)
	}

	/// Creates the pipeline cache, seeded with the blob a previous run
	/// persisted. A missing or corrupt blob is only worth a warning.
	unsafe fn create_pipeline_cache(&self) -> vk::PipelineCache {
		let blob = std::fs::read(cache_path()).unwrap_or_else(|e| {
			log::warn!("no pipeline cache found: {e}");
			Vec::new()
		});

		let info = vk::PipelineCacheCreateInfo::builder().initial_data(&blob);
		match self.device.create_pipeline_cache(&info, None) {
			Ok(cache) => cache,
			Err(e) => {
				log::warn!("pipeline cache rejected, starting cold: {e}");
				let empty = vk::PipelineCacheCreateInfo::builder();
				self.device.create_pipeline_cache(&empty, None).unwrap_or(vk::PipelineCache::null())
			}
		}
	}

	/// Writes the cache blob back under an exclusive lock file; when
	/// another process holds the lock the write is skipped.
	unsafe fn persist_pipeline_cache(&self, cache: vk::PipelineCache) {
		let data = match self.device.get_pipeline_cache_data(cache) {
			Ok(data) => data,
			Err(e) => {
				log::warn!("cannot serialize pipeline cache: {e}");
				return;
			}
		};

		let lock_path = cache_path().with_extension("lock");
		let lock = std::fs::OpenOptions::new().write(true).create_new(true).open(&lock_path);
		match lock {
			Ok(mut lock_file) => {
				let _ = lock_file.write_all(b"beamtrace");
				if let Err(e) = std::fs::write(cache_path(), &data) {
					log::warn!("cannot persist pipeline cache: {e}");
				}
				let _ = std::fs::remove_file(&lock_path);
			}
			Err(_) => {
				log::warn!("pipeline cache is locked by another process, skipping write");
			}
		}
	}
}

unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32)> {
	let devices = instance.enumerate_physical_devices().map_err(device_err)?;
	if devices.is_empty() {
		return Err(Error::Device("no Vulkan device available".into()));
	}

	let mut best: Option<(vk::PhysicalDevice, u32, i32)> = None;
	for device in devices {
		let families = instance.get_physical_device_queue_family_properties(device);
		let Some(family) = families
			.iter()
			.position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE))
		else {
			continue;
		};

		let properties = instance.get_physical_device_properties(device);
		let score = match properties.device_type {
			vk::PhysicalDeviceType::DISCRETE_GPU => 3,
			vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
			vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
			_ => 0,
		};

		if best.map_or(true, |(_, _, s)| score > s) {
			best = Some((device, family as u32, score));
		}
	}

	best.map(|(device, family, _)| (device, family))
		.ok_or_else(|| Error::Device("no compute-capable queue family".into()))
}

impl Drop for VulkanTracer {
	fn drop(&mut self) {
		unsafe {
			let _ = self.device.device_wait_idle();
			ManuallyDrop::drop(&mut self.allocator);
			self.device.destroy_command_pool(self.command_pool, None);
			self.device.destroy_device(None);
			self.instance.destroy_instance(None);
		}
	}
}
