use std::ops::Range;
use std::rc::Rc;

use web_sys::HtmlCanvasElement;
use wgpu::util::DeviceExt;

use tilewall_shared::grid::{GridPos, INNER_TILE_HEIGHT, INNER_TILE_WIDTH, tile_origin};

use crate::batching::{BatchLimits, SOLID_SLOT, TileInstance, crop_uv, plan_batches};
use crate::config::{CanvasConfig, MAX_TEXTURE_SLOTS};
use crate::frame::{CLEAR_COLOR, Frame, LOADING_COLOR, TileFill};
use crate::image_cache::{DecodedImage, ImageId};
use crate::texture_cache::{GpuResource, TextureCache};
use crate::viewport::Viewport;
use crate::web_image::WebImage;

/// Uploads allowed per frame; the rest draw as loading placeholders.
const MAX_UPLOADS_PER_FRAME: usize = 24;
const FULL_UV: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

const HOVER_COLOR: [f32; 3] = [0.545, 0.361, 0.965];
const HOVER_BORDER_PX: f32 = 1.5;
const HOVER_FILL_ALPHA: f32 = 0.08;
const SELECTED_COLOR: [f32; 4] = [0.96, 0.96, 0.98, 0.95];
const SELECTED_BORDER_PX: f32 = 2.0;

pub struct RenderFrameInput<'a> {
    pub vp: &'a Viewport,
    pub frame: &'a Frame<WebImage>,
    pub now: f64,
}

// --- GPU data types ---

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
}

const QUAD_VERTICES: &[Vertex] = &[
    Vertex {
        position: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, 0.0],
    },
    Vertex {
        position: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, 1.0],
    },
];

const QUAD_INDICES: &[u16] = &[0, 1, 2, 2, 1, 3];

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ViewportUniform {
    offset: [f32; 2],
    scale: f32,
    _pad0: f32,
    resolution: [f32; 2],
    tile_size: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayUniform {
    rect: [f32; 4],
    color: [f32; 4],
    border_px: f32,
    fill_alpha: f32,
    scale: f32,
    _pad: f32,
}

impl OverlayUniform {
    fn for_cell(pos: GridPos, color: [f32; 4], border_px: f32, fill_alpha: f32, scale: f32) -> Self {
        let (x, y) = tile_origin(pos);
        Self {
            rect: [x as f32, y as f32, INNER_TILE_WIDTH as f32, INNER_TILE_HEIGHT as f32],
            color,
            border_px,
            fill_alpha,
            scale,
            _pad: 0.0,
        }
    }
}

// --- Resident thumbnails ---

struct TextureInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A thumbnail uploaded to the GPU. Clones share the texture.
#[derive(Clone)]
pub struct GpuTexture {
    inner: Rc<TextureInner>,
}

impl GpuTexture {
    fn view(&self) -> &wgpu::TextureView {
        &self.inner.view
    }
}

impl GpuResource for GpuTexture {
    fn destroy(&self) {
        self.inner.texture.destroy();
    }
}

/// Tile with its texture already resolved, waiting for a batch slot.
struct PreparedTile {
    pos: GridPos,
    color: [f32; 3],
    uv: [f32; 4],
    alpha: f32,
}

// --- GpuRenderer ---

pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,

    // Shared geometry
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,

    // Viewport uniform (shared by both pipelines)
    viewport_buffer: wgpu::Buffer,
    viewport_bind_group: wgpu::BindGroup,

    // Instanced tile pipeline, one bind group of textures per batch
    tile_pipeline: wgpu::RenderPipeline,
    tile_bind_group_layout: wgpu::BindGroupLayout,
    tile_sampler: wgpu::Sampler,
    placeholder_view: wgpu::TextureView,
    instance_buffer: wgpu::Buffer,
    instance_capacity: u32,
    textures: TextureCache<GpuTexture>,
    limits: BatchLimits,

    // Overlay pipeline (selection + hover quads)
    overlay_pipeline: wgpu::RenderPipeline,
    overlay_buffer_sel: wgpu::Buffer,
    overlay_bind_group_sel: wgpu::BindGroup,
    overlay_buffer_hov: wgpu::Buffer,
    overlay_bind_group_hov: wgpu::BindGroup,

    width: u32,
    height: u32,
    dpr: f32,

    // Reused per frame
    prepared: Vec<PreparedTile>,
    instances_buf: Vec<TileInstance>,

    // FPS tracking
    frame_count: u32,
    fps_log_time: f64,
}

/// First backend to try for a browser with or without WebGPU.
fn preferred_path(webgpu_available: bool) -> wgpu::Backends {
    if webgpu_available {
        wgpu::Backends::BROWSER_WEBGPU
    } else {
        wgpu::Backends::GL
    }
}

impl GpuRenderer {
    /// Async initialization. WebGPU is tried first when the browser exposes a
    /// usable adapter, WebGL2 otherwise or when the WebGPU path fails.
    pub async fn init(canvas: HtmlCanvasElement, config: &CanvasConfig) -> Result<Self, String> {
        let path = preferred_path(wgpu::util::is_browser_webgpu_supported().await);
        if path == wgpu::Backends::BROWSER_WEBGPU {
            match Self::init_with_backends(canvas.clone(), config, path, "webgpu").await {
                Ok(renderer) => return Ok(renderer),
                Err(e) => tracing::warn!(error = %e, "webgpu init failed, retrying with webgl"),
            }
        }
        Self::init_with_backends(canvas, config, wgpu::Backends::GL, "webgl").await
    }

    /// Core initialization parameterized by backend selection.
    async fn init_with_backends(
        canvas: HtmlCanvasElement,
        config: &CanvasConfig,
        backends: wgpu::Backends,
        backend_path: &str,
    ) -> Result<Self, String> {
        let width = canvas.width().max(1);
        let height = canvas.height().max(1);
        let rect = canvas.get_bounding_client_rect();
        let css_width = rect.width() as f32;
        let dpr = if css_width > 0.0 {
            (width as f32 / css_width).max(0.5)
        } else {
            web_sys::window()
                .map(|w| w.device_pixel_ratio() as f32)
                .unwrap_or(1.0)
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface_target = wgpu::SurfaceTarget::Canvas(canvas);
        let surface = instance
            .create_surface(surface_target)
            .map_err(|e| format!("wgpu init ({backend_path}) create_surface: {e}"))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                ..Default::default()
            })
            .await
            .ok_or_else(|| format!("wgpu init ({backend_path}): no suitable GPU adapter found"))?;

        // WebGL2 adapters expose zero compute limits.
        let required_limits = if backends == wgpu::Backends::GL {
            wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
        } else {
            wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tilewall-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| format!("wgpu init ({backend_path}) request_device: {e}"))?;

        let mut surface_config = surface
            .get_default_config(&adapter, width, height)
            .ok_or_else(|| format!("wgpu init ({backend_path}): surface unsupported by adapter"))?;
        let caps = surface.get_capabilities(&adapter);

        // Thumbnails are uploaded as Rgba8Unorm; avoid a second gamma step.
        if let Some(format) = caps.formats.iter().copied().find(|f| !f.is_srgb()) {
            surface_config.format = format;
        }

        if caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::Opaque) {
            surface_config.alpha_mode = wgpu::CompositeAlphaMode::Opaque;
        } else if caps
            .alpha_modes
            .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            surface_config.alpha_mode = wgpu::CompositeAlphaMode::PreMultiplied;
        }
        let format = surface_config.format;

        tracing::info!(
            path = backend_path,
            format = ?surface_config.format,
            present = ?surface_config.present_mode,
            alpha = ?surface_config.alpha_mode,
            "wgpu init"
        );
        surface.configure(&device, &surface_config);

        // --- Shared geometry ---
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-verts"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad-indices"),
            contents: bytemuck::cast_slice(QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        // --- Viewport uniform ---
        let viewport_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("viewport-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let viewport_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("viewport-ubo"),
            contents: bytemuck::cast_slice(&[ViewportUniform {
                offset: [0.0, 0.0],
                scale: 1.0,
                _pad0: 0.0,
                resolution: [width as f32 / dpr, height as f32 / dpr],
                tile_size: [INNER_TILE_WIDTH as f32, INNER_TILE_HEIGHT as f32],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("viewport-bg"),
            layout: &viewport_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        };

        // --- Tile pipeline ---
        let tile_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tile-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("tile.wgsl").into()),
        });

        let instance_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TileInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 8,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: 32,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        };

        let mut tile_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MAX_TEXTURE_SLOTS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        tile_entries.push(wgpu::BindGroupLayoutEntry {
            binding: MAX_TEXTURE_SLOTS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let tile_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("tile-bgl"),
                entries: &tile_entries,
            });

        let tile_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tile-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        // Bound to slots a batch leaves empty.
        let placeholder = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("placeholder-tex"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &placeholder,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255, 255, 255, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let placeholder_view = placeholder.create_view(&wgpu::TextureViewDescriptor::default());

        let tile_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tile-pl"),
            bind_group_layouts: &[&viewport_bind_group_layout, &tile_bind_group_layout],
            push_constant_ranges: &[],
        });

        let tile_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("tile-pipeline"),
            layout: Some(&tile_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &tile_shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout.clone(), instance_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &tile_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let initial_capacity = 256u32;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instance-buf"),
            size: (initial_capacity as u64) * std::mem::size_of::<TileInstance>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // --- Overlay pipeline ---
        let overlay_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("overlay.wgsl").into()),
        });

        let overlay_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("overlay-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let overlay_buffer = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<OverlayUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let overlay_bind_group = |label, buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &overlay_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };
        let overlay_buffer_sel = overlay_buffer("overlay-ubo-sel");
        let overlay_bind_group_sel = overlay_bind_group("overlay-bg-sel", &overlay_buffer_sel);
        let overlay_buffer_hov = overlay_buffer("overlay-ubo-hov");
        let overlay_bind_group_hov = overlay_bind_group("overlay-bg-hov", &overlay_buffer_hov);

        let overlay_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("overlay-pl"),
                bind_group_layouts: &[&viewport_bind_group_layout, &overlay_bind_group_layout],
                push_constant_ranges: &[],
            });

        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-pipeline"),
            layout: Some(&overlay_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &overlay_shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &overlay_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            vertex_buffer,
            index_buffer,
            viewport_buffer,
            viewport_bind_group,
            tile_pipeline,
            tile_bind_group_layout,
            tile_sampler,
            placeholder_view,
            instance_buffer,
            instance_capacity: initial_capacity,
            textures: TextureCache::new(config.texture_capacity, config.texture_evict_batch),
            limits: BatchLimits {
                texture_slots: config.texture_slots,
                max_instances: config.max_instances,
                draw_call_budget: config.draw_call_budget,
            },
            overlay_pipeline,
            overlay_buffer_sel,
            overlay_bind_group_sel,
            overlay_buffer_hov,
            overlay_bind_group_hov,
            width,
            height,
            dpr,
            prepared: Vec::new(),
            instances_buf: Vec::new(),
            frame_count: 0,
            fps_log_time: 0.0,
        })
    }

    /// Resize the surface when the canvas size changes.
    pub fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.dpr = dpr;
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    /// Drop textures whose source images were evicted from the image cache.
    pub fn forget_images(&mut self, evicted: &[ImageId]) {
        for id in evicted {
            self.textures.forget(*id);
        }
    }

    fn upload(&self, image: &WebImage) -> Option<GpuTexture> {
        let (w, h) = (image.width(), image.height());
        if w == 0 || h == 0 {
            return None;
        }
        let size = wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("thumb-tex"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        self.queue.copy_external_image_to_texture(
            &wgpu::CopyExternalImageSourceInfo {
                source: wgpu::ExternalImageSource::ImageBitmap(image.bitmap().clone()),
                origin: wgpu::Origin2d::ZERO,
                flip_y: false,
            },
            wgpu::CopyExternalImageDestInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
                color_space: wgpu::PredefinedColorSpace::Srgb,
                premultiplied_alpha: false,
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some(GpuTexture {
            inner: Rc::new(TextureInner { texture, view }),
        })
    }

    /// Resolve every frame tile to a resident texture or a flat color,
    /// uploading new thumbnails within the per-frame allowance. Returns the
    /// texture key per tile and whether some upload had to wait.
    fn resolve_tiles(&mut self, frame: &Frame<WebImage>) -> (Vec<Option<ImageId>>, bool) {
        self.prepared.clear();
        let mut keys = Vec::with_capacity(frame.tiles.len());
        let mut uploads = 0;
        let mut starved = false;

        for tile in &frame.tiles {
            let (key, color, uv) = match &tile.fill {
                TileFill::Color(color) => (None, *color, FULL_UV),
                TileFill::Image(cached) => {
                    let uv = crop_uv(cached.image.width(), cached.image.height());
                    if self.textures.get(cached.id).is_some() {
                        (Some(cached.id), WHITE, uv)
                    } else if uploads < MAX_UPLOADS_PER_FRAME && self.textures.has_room() {
                        match self.upload(&cached.image) {
                            Some(texture) => {
                                uploads += 1;
                                self.textures.insert(cached.id, texture);
                                (Some(cached.id), WHITE, uv)
                            }
                            None => (None, LOADING_COLOR, FULL_UV),
                        }
                    } else {
                        starved = true;
                        (None, LOADING_COLOR, FULL_UV)
                    }
                }
            };
            keys.push(key);
            self.prepared.push(PreparedTile {
                pos: tile.pos,
                color,
                uv,
                alpha: tile.alpha,
            });
        }

        (keys, starved)
    }

    fn batch_bind_group(&mut self, textures: &[ImageId]) -> wgpu::BindGroup {
        let resident: Vec<Option<GpuTexture>> =
            textures.iter().map(|id| self.textures.get(*id)).collect();

        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = (0..MAX_TEXTURE_SLOTS)
            .map(|slot| {
                let view = resident
                    .get(slot)
                    .and_then(|t| t.as_ref())
                    .map(|t| t.view())
                    .unwrap_or(&self.placeholder_view);
                wgpu::BindGroupEntry {
                    binding: slot as u32,
                    resource: wgpu::BindingResource::TextureView(view),
                }
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: MAX_TEXTURE_SLOTS as u32,
            resource: wgpu::BindingResource::Sampler(&self.tile_sampler),
        });

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tile-batch-bg"),
            layout: &self.tile_bind_group_layout,
            entries: &entries,
        })
    }

    /// Plan batches, fill the instance buffer in batch order and build one
    /// texture bind group per batch.
    fn build_batches(&mut self, keys: &[Option<ImageId>]) -> Vec<(wgpu::BindGroup, Range<u32>)> {
        let plan = plan_batches(keys, self.limits);
        if plan.dropped > 0 {
            tracing::debug!(dropped = plan.dropped, "draw-call budget exhausted");
        }

        self.instances_buf.clear();
        let mut draws = Vec::with_capacity(plan.batches.len());
        for batch in &plan.batches {
            let start = self.instances_buf.len() as u32;
            for &(index, slot) in &batch.tiles {
                let tile = &self.prepared[index];
                let instance = if slot == SOLID_SLOT {
                    TileInstance::solid(tile.pos, tile.color, tile.alpha, 1.0)
                } else {
                    TileInstance::textured(tile.pos, slot as u32, tile.uv, tile.alpha, 1.0)
                };
                self.instances_buf.push(instance);
            }
            let end = self.instances_buf.len() as u32;
            let bind_group = self.batch_bind_group(&batch.textures);
            draws.push((bind_group, start..end));
        }

        let count = self.instances_buf.len() as u32;
        if count > self.instance_capacity {
            self.instance_capacity = count.next_power_of_two();
            self.instance_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("instance-buf"),
                size: (self.instance_capacity as u64) * std::mem::size_of::<TileInstance>() as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        if !self.instances_buf.is_empty() {
            self.queue.write_buffer(
                &self.instance_buffer,
                0,
                bytemuck::cast_slice(&self.instances_buf),
            );
        }

        draws
    }

    fn log_fps(&mut self, now: f64) {
        self.frame_count += 1;
        if self.fps_log_time == 0.0 {
            self.fps_log_time = now;
            return;
        }
        let elapsed = now - self.fps_log_time;
        if elapsed >= 2000.0 {
            let fps = self.frame_count as f64 / (elapsed / 1000.0);
            tracing::debug!(
                fps = (fps * 10.0).round() / 10.0,
                frames = self.frame_count,
                textures = self.textures.len(),
                "frame rate"
            );
            self.frame_count = 0;
            self.fps_log_time = now;
        }
    }

    /// Render a full frame. Returns true when thumbnails are waiting for an
    /// upload slot and another frame is needed.
    pub fn render(&mut self, input: RenderFrameInput<'_>) -> bool {
        let RenderFrameInput { vp, frame, now } = input;
        self.log_fps(now);
        self.textures.begin_frame();

        // CSS pixel dimensions (shaders work in CSS space)
        let w = self.width as f32 / self.dpr;
        let h = self.height as f32 / self.dpr;

        self.queue.write_buffer(
            &self.viewport_buffer,
            0,
            bytemuck::cast_slice(&[ViewportUniform {
                offset: [vp.pan_x as f32, vp.pan_y as f32],
                scale: vp.zoom as f32,
                _pad0: 0.0,
                resolution: [w, h],
                tile_size: [INNER_TILE_WIDTH as f32, INNER_TILE_HEIGHT as f32],
            }]),
        );

        let (keys, starved) = self.resolve_tiles(frame);
        let draws = self.build_batches(&keys);

        // Overlay uniforms are written before the pass; mid-pass writes
        // stall WebGL2.
        let draw_sel = match frame.selected {
            Some(pos) => {
                self.queue.write_buffer(
                    &self.overlay_buffer_sel,
                    0,
                    bytemuck::cast_slice(&[OverlayUniform::for_cell(
                        pos,
                        SELECTED_COLOR,
                        SELECTED_BORDER_PX,
                        0.0,
                        1.0,
                    )]),
                );
                true
            }
            None => false,
        };
        let draw_hov = match frame.hover {
            Some(hover) if frame.selected != Some(hover.pos) => {
                let [r, g, b] = HOVER_COLOR;
                self.queue.write_buffer(
                    &self.overlay_buffer_hov,
                    0,
                    bytemuck::cast_slice(&[OverlayUniform::for_cell(
                        hover.pos,
                        [r, g, b, hover.alpha],
                        HOVER_BORDER_PX,
                        HOVER_FILL_ALPHA,
                        hover.scale,
                    )]),
                );
                true
            }
            _ => false,
        };

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_config);
                return true;
            }
            Err(err) => {
                tracing::warn!(error = %err, "surface texture unavailable");
                return false;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render-encoder"),
            });

        {
            let [r, g, b] = CLEAR_COLOR;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a: 1.0 }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            if !draws.is_empty() {
                pass.set_pipeline(&self.tile_pipeline);
                pass.set_bind_group(0, &self.viewport_bind_group, &[]);
                pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
                pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                for (bind_group, instances) in &draws {
                    if instances.is_empty() {
                        continue;
                    }
                    pass.set_bind_group(1, bind_group, &[]);
                    pass.draw_indexed(0..6, 0, instances.clone());
                }
            }

            if draw_sel || draw_hov {
                pass.set_pipeline(&self.overlay_pipeline);
                pass.set_bind_group(0, &self.viewport_bind_group, &[]);
                pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

                if draw_sel {
                    pass.set_bind_group(1, &self.overlay_bind_group_sel, &[]);
                    pass.draw_indexed(0..6, 0, 0..1);
                }

                if draw_hov {
                    pass.set_bind_group(1, &self.overlay_bind_group_hov, &[]);
                    pass.draw_indexed(0..6, 0, 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        let released = self.textures.release_retired();
        if released > 0 {
            tracing::debug!(released, "released gpu textures");
        }

        starved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webgpu_is_preferred_only_when_available() {
        assert_eq!(preferred_path(true), wgpu::Backends::BROWSER_WEBGPU);
        assert_eq!(preferred_path(false), wgpu::Backends::GL);
    }
}
