//! WebGPU (wgpu) backend.
//!
//! The candidate matrix is uploaded once per search as a true CSR matrix
//! (`row_offsets`, `col_index`, `weights`). Spectra are expanded on the host
//! with the same kernel profile as the CPU strategies and shipped per
//! dispatch, either as one dense vector (SpMV), a dense bin-major block
//! (SpMM) or a sparse CSR block (SpGEMM). Raw scores come back to the host,
//! which applies normalization and top-N selection.
//!
//! Only float arithmetic is available on the device. Every call is
//! synchronous, and device errors are captured through error scopes and
//! reported as [`SearchError::DeviceFailure`] instead of panicking.
//!
//! This module is only compiled with the `webgpu` feature.

use std::sync::OnceLock;
use std::time::Instant;

use tracing::{
    debug,
    info,
};
use wgpu::util::DeviceExt;

use crate::errors::{
    try_zeroed,
    InputError,
    Result,
    SearchError,
};
use crate::models::config::{
    GpuMethod,
    NumericMode,
    SearchConfig,
};
use crate::models::sparse::{
    CandidateMatrix,
    SpectrumBatch,
};
use crate::scoring::{
    Arithmetic,
    ExpandedSpectrum,
    FloatArithmetic,
    MatchKernel,
};
use crate::selection::{
    select_dense,
    TopN,
    PADDING,
};

const SPMV_KERNEL_SOURCE: &str = include_str!("../../kernels/spmv.wgsl");
const SPMM_KERNEL_SOURCE: &str = include_str!("../../kernels/spmm.wgsl");
const SPGEMM_KERNEL_SOURCE: &str = include_str!("../../kernels/spgemm.wgsl");

/// Must match `@workgroup_size` in the kernels.
const WORKGROUP_SIZE: u32 = 64;

/// Uniform block shared by the three kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct Params {
    num_rows: u32,
    block_width: u32,
    dispatch_width: u32,
    stride: u32,
}

// SAFETY: Params is repr(C) with only u32 fields and no padding.
unsafe impl bytemuck::Pod for Params {}
unsafe impl bytemuck::Zeroable for Params {}

/// Information about a discovered WebGPU adapter.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend: String,
    pub is_gpu: bool,
}

/// Lists the adapters wgpu can see, without creating a device.
pub fn probe_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            DeviceInfo {
                name: info.name.clone(),
                backend: format!("{:?}", info.backend),
                is_gpu: matches!(
                    info.device_type,
                    wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu
                ),
            }
        })
        .collect()
}

/// Candidate matrix resident on the device.
struct DeviceCandidates {
    row_offsets: wgpu::Buffer,
    col_index: wgpu::Buffer,
    weights: wgpu::Buffer,
    num_rows: usize,
    lens: Vec<usize>,
}

pub struct WebGpuEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    spmv: OnceLock<wgpu::ComputePipeline>,
    spmm: OnceLock<wgpu::ComputePipeline>,
    spgemm: OnceLock<wgpu::ComputePipeline>,
    device_name: String,
    max_buffer_size: u64,
    max_workgroups_per_dim: u32,
}

impl std::fmt::Debug for WebGpuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebGpuEngine")
            .field("device_name", &self.device_name)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish_non_exhaustive()
    }
}

static SHARED_ENGINE: OnceLock<std::result::Result<WebGpuEngine, String>> = OnceLock::new();

/// Process-wide engine, created on first use.
///
/// A failed initialization is remembered and reported on every call.
pub fn shared_engine() -> Result<&'static WebGpuEngine> {
    SHARED_ENGINE
        .get_or_init(|| WebGpuEngine::new().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| SearchError::DeviceFailure(e.clone()))
}

impl WebGpuEngine {
    /// Creates an engine on the highest performance adapter available.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|e| SearchError::device(format!("no WebGPU adapter: {}", e)))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("cvsearch-webgpu"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| SearchError::device(format!("request_device failed: {}", e)))?;

        info!(
            "Using WebGPU device '{}' ({:?}, {:?})",
            info.name, info.backend, info.device_type
        );

        Ok(Self {
            device,
            queue,
            spmv: OnceLock::new(),
            spmm: OnceLock::new(),
            spgemm: OnceLock::new(),
            device_name: info.name,
            max_buffer_size: limits.max_storage_buffer_binding_size as u64,
            max_workgroups_per_dim: limits.max_compute_workgroups_per_dimension,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    fn make_pipeline(&self, label: &str, source: &str, entry: &str) -> wgpu::ComputePipeline {
        let t0 = Instant::now();
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            });
        debug!("Compiled {} in {:?}", label, t0.elapsed());
        pipeline
    }

    fn pipeline(&self, method: GpuMethod) -> &wgpu::ComputePipeline {
        match method {
            GpuMethod::Spmv => self
                .spmv
                .get_or_init(|| self.make_pipeline("spmv", SPMV_KERNEL_SOURCE, "spmv")),
            GpuMethod::Spmm => self
                .spmm
                .get_or_init(|| self.make_pipeline("spmm", SPMM_KERNEL_SOURCE, "spmm")),
            GpuMethod::Spgemm => self
                .spgemm
                .get_or_init(|| self.make_pipeline("spgemm", SPGEMM_KERNEL_SOURCE, "spgemm")),
        }
    }

    fn check_size(&self, bytes: u64, what: &str) -> Result<()> {
        check_binding(bytes, self.max_buffer_size, what)
    }

    /// Runs `f` inside out-of-memory and validation error scopes, so
    /// allocation and binding failures surface as device errors.
    fn scoped<T>(&self, what: &str, f: impl FnOnce() -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(err) => Err(SearchError::device(format!("{}: {}", what, err))),
            None => Ok(out),
        }
    }


    // Zero-sized bindings are invalid, empty arrays get one padding element.
    fn storage_init<T: bytemuck::Pod + Default>(
        &self,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let pad = [T::default()];
        let contents: &[T] = if data.is_empty() { &pad } else { data };
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage,
            })
    }

    fn storage(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(4),
            usage,
            mapped_at_creation: false,
        })
    }

    fn upload_candidates(&self, candidates: &CandidateMatrix<'_>) -> Result<DeviceCandidates> {
        let rows = candidates.rows();
        let base = rows.offsets()[0];
        let row_offsets: Vec<u32> = rows.offsets().iter().map(|&x| (x - base) as u32).collect();
        let col_index: Vec<u32> = rows.values()[base..rows.offsets()[rows.num_rows()]]
            .iter()
            .map(|&x| x as u32)
            .collect();
        let weights: Vec<f32> = match candidates.weights() {
            Some(w) => w[base..base + col_index.len()].to_vec(),
            None => vec![1.0; col_index.len()],
        };
        self.check_size(byte_len(&row_offsets), "candidate row offsets")?;
        self.check_size(byte_len(&col_index), "candidate matrix")?;
        self.check_size(byte_len(&weights), "candidate weights")?;

        let (row_offsets, col_index, weights) = self.scoped("candidate upload", || {
            (
                self.storage_init(
                    "candidate_row_offsets",
                    &row_offsets,
                    wgpu::BufferUsages::STORAGE,
                ),
                self.storage_init("candidate_col_index", &col_index, wgpu::BufferUsages::STORAGE),
                self.storage_init("candidate_weights", &weights, wgpu::BufferUsages::STORAGE),
            )
        })?;
        Ok(DeviceCandidates {
            row_offsets,
            col_index,
            weights,
            num_rows: rows.num_rows(),
            lens: (0..rows.num_rows()).map(|r| rows.row_len(r)).collect(),
        })
    }

    /// Splits `threads` invocations over a 2D grid of workgroups.
    fn tile(&self, threads: usize) -> Result<(u32, u32, u32)> {
        let groups = (threads as u64).div_ceil(WORKGROUP_SIZE as u64).max(1);
        let max = self.max_workgroups_per_dim as u64;
        let (wx, wy) = if groups <= max {
            (groups, 1)
        } else {
            (max, groups.div_ceil(max))
        };
        if wy > max {
            return Err(SearchError::device(format!(
                "dispatch of {} invocations exceeds the workgroup grid",
                threads
            )));
        }
        Ok((wx as u32, wy as u32, wx as u32 * WORKGROUP_SIZE))
    }

    fn bind(&self, method: GpuMethod, buffers: &[&wgpu::Buffer]) -> Result<wgpu::BindGroup> {
        self.scoped(method.label(), || {
            let layout = self.pipeline(method).get_bind_group_layout(0);
            let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
                .iter()
                .enumerate()
                .map(|(i, b)| wgpu::BindGroupEntry {
                    binding: i as u32,
                    resource: b.as_entire_binding(),
                })
                .collect();
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(method.label()),
                layout: &layout,
                entries: &entries,
            })
        })
    }

    /// Runs one dispatch and reads back `count` scores.
    fn dispatch_and_read(
        &self,
        method: GpuMethod,
        bind_group: &wgpu::BindGroup,
        params_buf: &wgpu::Buffer,
        mut params: Params,
        scores_buf: &wgpu::Buffer,
        count: usize,
    ) -> Result<Vec<f32>> {
        let threads = params.num_rows as usize * params.block_width as usize;
        let (wx, wy, width) = self.tile(threads)?;
        params.dispatch_width = width;
        let size = (count * std::mem::size_of::<f32>()) as u64;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        self.queue
            .write_buffer(params_buf, 0, bytemuck::bytes_of(&params));
        let staging = self.storage(
            "scores_staging",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(method.label()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(method.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.pipeline(method));
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
        }
        encoder.copy_buffer_to_buffer(scores_buf, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SearchError::device(err));
        }
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(SearchError::device(err));
        }

        let slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(SearchError::device)?;
        rx.recv()
            .map_err(SearchError::device)?
            .map_err(SearchError::device)?;

        let out: Vec<f32> = bytemuck::cast_slice(&slice.get_mapped_range()[..]).to_vec();
        staging.unmap();
        Ok(out)
    }

    /// Runs the search on the device.
    ///
    /// Returns `num_spectra * top_n` candidate indices, spectrum-major, with
    /// the same ordering and padding rules as the CPU backend.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn search(
        &self,
        candidates: &CandidateMatrix<'_>,
        spectra: &SpectrumBatch<'_>,
        config: &SearchConfig,
    ) -> Result<Vec<i32>> {
        config.validate()?;
        if config.numeric == NumericMode::Integer {
            return Err(InputError::UnsupportedOnDevice {
                context: "integer arithmetic",
            }
            .into());
        }

        let top_n = config.top_n_usize();
        let num_spectra = spectra.num_spectra();
        let out_len = num_spectra
            .checked_mul(top_n)
            .ok_or(SearchError::AllocationFailure {
                bytes: usize::MAX,
                context: "result buffer",
            })?;
        let mut out: Vec<i32> = try_zeroed(out_len, "result buffer")?;
        if num_spectra == 0 {
            return Ok(out);
        }
        if candidates.num_candidates() == 0 {
            out.fill(PADDING);
            return Ok(out);
        }

        let method = GpuMethod::from_strategy(config.strategy());
        let st = Instant::now();
        let dev = self.upload_candidates(candidates)?;
        let job = Job {
            engine: self,
            dev: &dev,
            spectra,
            kernel: config.kernel(),
            encoding_size: config.encoding.encoding_size(),
            normalize: config.normalize,
            top_n,
        };
        match method {
            GpuMethod::Spmv => job.spmv(&mut out)?,
            GpuMethod::Spmm => job.spmm(config.batch_size_usize(), &mut out)?,
            GpuMethod::Spgemm => job.spgemm(config.batch_size_usize(), &mut out)?,
        }
        info!(
            "Searched {} spectra against {} candidates with {} on '{}' in {:?}",
            num_spectra,
            dev.num_rows,
            method,
            self.device_name,
            st.elapsed()
        );
        Ok(out)
    }
}

fn check_binding(bytes: u64, limit: u64, what: &str) -> Result<()> {
    if bytes > limit {
        return Err(SearchError::device(format!(
            "{} needs {} bytes, device binding limit is {}",
            what, bytes, limit
        )));
    }
    Ok(())
}

fn byte_len<T>(data: &[T]) -> u64 {
    (data.len() as u64).saturating_mul(std::mem::size_of::<T>() as u64)
}

/// State of one device search.
struct Job<'a> {
    engine: &'a WebGpuEngine,
    dev: &'a DeviceCandidates,
    spectra: &'a SpectrumBatch<'a>,
    kernel: MatchKernel,
    encoding_size: usize,
    normalize: bool,
    top_n: usize,
}

impl Job<'_> {
    fn params_buffer(&self) -> Result<wgpu::Buffer> {
        self.engine.scoped("params", || {
            self.engine.storage(
                "params",
                std::mem::size_of::<Params>() as u64,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            )
        })
    }

    fn scores_buffer(&self, count: usize) -> Result<wgpu::Buffer> {
        let size = (count as u64).saturating_mul(std::mem::size_of::<f32>() as u64);
        self.engine.check_size(size, "score block")?;
        self.engine.scoped("score block", || {
            self.engine.storage(
                "scores",
                size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            )
        })
    }

    /// Largest block of spectra whose buffers fit the binding limit.
    fn block_width(&self, requested: usize, bytes_per_spectrum: usize) -> usize {
        let limit = self.engine.max_buffer_size as usize;
        let by_block = limit / bytes_per_spectrum.max(1);
        let by_scores = limit / (self.dev.num_rows * std::mem::size_of::<f32>()).max(1);
        let width = requested.min(by_block).min(by_scores).max(1);
        if width < requested {
            debug!(
                "Capped device block to {} spectra (requested {})",
                width, requested
            );
        }
        width
    }

    /// Host side of every method: normalization and top-N of a score block.
    fn finish_block(&self, raw: &[f32], out: &mut [i32], selector: &mut TopN<f32>, scores: &mut Vec<f32>) {
        let rows = self.dev.num_rows;
        for (block_scores, out) in raw.chunks(rows).zip(out.chunks_mut(self.top_n)) {
            scores.clear();
            scores.extend(
                block_scores
                    .iter()
                    .zip(self.dev.lens.iter())
                    .map(|(&acc, &len)| FloatArithmetic::finish(acc, len, self.normalize)),
            );
            select_dense(&scores[..], selector, out);
        }
    }

    fn spmv(&self, out: &mut [i32]) -> Result<()> {
        let engine = self.engine;
        let rows = self.dev.num_rows;
        engine.check_size((self.encoding_size * 4) as u64, "dense spectrum")?;
        let dense_buf = engine.scoped("dense spectrum", || {
            engine.storage(
                "dense_spectrum",
                (self.encoding_size * 4) as u64,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            )
        })?;
        let scores_buf = self.scores_buffer(rows)?;
        let params_buf = self.params_buffer()?;
        let bind_group = engine.bind(
            GpuMethod::Spmv,
            &[
                &self.dev.row_offsets,
                &self.dev.col_index,
                &self.dev.weights,
                &dense_buf,
                &scores_buf,
                &params_buf,
            ],
        )?;

        let mut dense: Vec<f32> = try_zeroed(self.encoding_size.max(1), "dense spectrum")?;
        let mut expanded = ExpandedSpectrum::<FloatArithmetic>::default();
        let mut selector = TopN::for_candidates(self.top_n, self.dev.num_rows);
        let mut scores = Vec::with_capacity(rows);
        let params = Params {
            num_rows: rows as u32,
            block_width: 1,
            dispatch_width: 0,
            stride: 1,
        };

        for (spec, out) in out.chunks_mut(self.top_n).enumerate() {
            expanded.rebuild(self.spectra.peaks(spec), &self.kernel, self.encoding_size);
            expanded.scatter_into(&mut dense);
            engine
                .queue
                .write_buffer(&dense_buf, 0, bytemuck::cast_slice(&dense));
            expanded.clear_from(&mut dense);
            let raw = engine.dispatch_and_read(
                GpuMethod::Spmv,
                &bind_group,
                &params_buf,
                params,
                &scores_buf,
                rows,
            )?;
            self.finish_block(&raw, out, &mut selector, &mut scores);
        }
        Ok(())
    }

    fn spmm(&self, batch_size: usize, out: &mut [i32]) -> Result<()> {
        let engine = self.engine;
        let rows = self.dev.num_rows;
        let width = self.block_width(batch_size, self.encoding_size * 4);
        let block_len = self.encoding_size * width;
        engine.check_size((block_len * 4) as u64, "dense spectrum block")?;

        let block_buf = engine.scoped("dense spectrum block", || {
            engine.storage(
                "dense_block",
                (block_len * 4) as u64,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            )
        })?;
        let scores_buf = self.scores_buffer(rows * width)?;
        let params_buf = self.params_buffer()?;
        let bind_group = engine.bind(
            GpuMethod::Spmm,
            &[
                &self.dev.row_offsets,
                &self.dev.col_index,
                &self.dev.weights,
                &block_buf,
                &scores_buf,
                &params_buf,
            ],
        )?;

        let mut block: Vec<f32> = try_zeroed(block_len.max(1), "dense spectrum block")?;
        let mut expanded: Vec<ExpandedSpectrum<FloatArithmetic>> =
            (0..width).map(|_| ExpandedSpectrum::default()).collect();
        let mut selector = TopN::for_candidates(self.top_n, self.dev.num_rows);
        let mut scores = Vec::with_capacity(rows);

        for (block_idx, out) in out.chunks_mut(width * self.top_n).enumerate() {
            let first = block_idx * width;
            let count = out.len() / self.top_n;
            for (j, exp) in expanded[..count].iter_mut().enumerate() {
                exp.rebuild(self.spectra.peaks(first + j), &self.kernel, self.encoding_size);
                for (&bin, &value) in exp.bins().iter().zip(exp.values()) {
                    block[bin as usize * width + j] = value;
                }
            }
            engine
                .queue
                .write_buffer(&block_buf, 0, bytemuck::cast_slice(&block));
            for (j, exp) in expanded[..count].iter().enumerate() {
                for &bin in exp.bins() {
                    block[bin as usize * width + j] = 0.0;
                }
            }

            let params = Params {
                num_rows: rows as u32,
                block_width: count as u32,
                dispatch_width: 0,
                stride: width as u32,
            };
            let raw = engine.dispatch_and_read(
                GpuMethod::Spmm,
                &bind_group,
                &params_buf,
                params,
                &scores_buf,
                rows * count,
            )?;
            self.finish_block(&raw, out, &mut selector, &mut scores);
        }
        Ok(())
    }

    fn spgemm(&self, batch_size: usize, out: &mut [i32]) -> Result<()> {
        let engine = self.engine;
        let rows = self.dev.num_rows;
        // Worst case an expanded spectrum is dense, size the block for that.
        let width = self.block_width(batch_size, self.encoding_size * 8);
        let scores_buf = self.scores_buffer(rows * width)?;
        let params_buf = self.params_buffer()?;

        let mut expanded = ExpandedSpectrum::<FloatArithmetic>::default();
        let mut selector = TopN::for_candidates(self.top_n, self.dev.num_rows);
        let mut scores = Vec::with_capacity(rows);
        let mut spec_offsets: Vec<u32> = Vec::with_capacity(width + 1);
        let mut spec_bins: Vec<u32> = Vec::new();
        let mut spec_values: Vec<f32> = Vec::new();

        for (block_idx, out) in out.chunks_mut(width * self.top_n).enumerate() {
            let first = block_idx * width;
            let count = out.len() / self.top_n;
            spec_offsets.clear();
            spec_bins.clear();
            spec_values.clear();
            spec_offsets.push(0);
            for j in 0..count {
                expanded.rebuild(self.spectra.peaks(first + j), &self.kernel, self.encoding_size);
                spec_bins.extend_from_slice(expanded.bins());
                spec_values.extend_from_slice(expanded.values());
                spec_offsets.push(spec_bins.len() as u32);
            }

            engine.check_size(byte_len(&spec_offsets), "spectrum block offsets")?;
            engine.check_size(byte_len(&spec_bins), "spectrum block bins")?;
            engine.check_size(byte_len(&spec_values), "spectrum block values")?;
            let (offsets_buf, bins_buf, values_buf) = engine.scoped("spectrum block upload", || {
                (
                    engine.storage_init(
                        "spectrum_offsets",
                        &spec_offsets,
                        wgpu::BufferUsages::STORAGE,
                    ),
                    engine.storage_init("spectrum_bins", &spec_bins, wgpu::BufferUsages::STORAGE),
                    engine.storage_init(
                        "spectrum_values",
                        &spec_values,
                        wgpu::BufferUsages::STORAGE,
                    ),
                )
            })?;
            let bind_group = engine.bind(
                GpuMethod::Spgemm,
                &[
                    &self.dev.row_offsets,
                    &self.dev.col_index,
                    &self.dev.weights,
                    &offsets_buf,
                    &bins_buf,
                    &values_buf,
                    &scores_buf,
                    &params_buf,
                ],
            )?;

            let params = Params {
                num_rows: rows as u32,
                block_width: count as u32,
                dispatch_width: 0,
                stride: 0,
            };
            let raw = engine.dispatch_and_read(
                GpuMethod::Spgemm,
                &bind_group,
                &params_buf,
                params,
                &scores_buf,
                rows * count,
            )?;
            self.finish_block(&raw, out, &mut selector, &mut scores);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encoding::EncodingConfig;
    use crate::models::config::Strategy;

    fn engine() -> Option<WebGpuEngine> {
        match WebGpuEngine::new() {
            Ok(e) => Some(e),
            Err(e) => {
                eprintln!("skipping, no WebGPU device: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_integer_mode_rejected() {
        let Some(engine) = engine() else { return };
        let enc = EncodingConfig::new(5, 1);
        let cands = CandidateMatrix::from_row_starts(&[1, 2], &[0], &enc).unwrap();
        let spectra = SpectrumBatch::from_row_starts(&[1], &[0], &enc).unwrap();
        let conf = SearchConfig {
            numeric: NumericMode::Integer,
            encoding: enc,
            ..Default::default()
        };
        assert!(matches!(
            engine.search(&cands, &spectra, &conf),
            Err(SearchError::InvalidInput(InputError::UnsupportedOnDevice { .. }))
        ));
    }

    #[test]
    fn test_device_methods_match_cpu() {
        let Some(engine) = engine() else { return };
        let enc = EncodingConfig::new(64, 1);
        let cand_values: Vec<i32> = (0..50).flat_map(|c| [c % 9, 12 + c % 17, 40 + c % 11]).collect();
        let cand_starts: Vec<i32> = (0..50).map(|c| c * 3).collect();
        let spec_values: Vec<i32> = (0..9).flat_map(|s| [s % 9, 13 + s, 45 + s]).collect();
        let spec_starts: Vec<i32> = (0..9).map(|s| s * 3).collect();
        let cands = CandidateMatrix::from_row_starts(&cand_values, &cand_starts, &enc).unwrap();
        let spectra = SpectrumBatch::from_row_starts(&spec_values, &spec_starts, &enc).unwrap();

        // Binary kernel keeps every score an exact small rational.
        let base = SearchConfig {
            top_n: 5,
            tolerance: 1.0,
            use_gaussian: false,
            batch_size: 4,
            encoding: enc,
            ..Default::default()
        };
        let expected = crate::backend::cpu::search(&cands, &spectra, &base).unwrap();
        for method in GpuMethod::ALL {
            let conf = base.clone().with_gpu_method(method);
            assert_eq!(conf.strategy(), method.strategy());
            assert_ne!(conf.strategy(), Strategy::SparseVector);
            let got = engine.search(&cands, &spectra, &conf).unwrap();
            assert_eq!(got, expected, "{}", method);
        }
    }

    #[test]
    fn test_binding_limit_checked() {
        assert!(check_binding(16, 16, "scores").is_ok());
        assert_eq!(byte_len(&[0u32; 3]), 12);
        assert_eq!(byte_len::<f32>(&[]), 0);
        match check_binding(17, 16, "candidate weights") {
            Err(SearchError::DeviceFailure(msg)) => assert!(msg.contains("candidate weights")),
            other => panic!("expected a device failure, got {:?}", other),
        }
    }

    #[test]
    fn test_every_candidate_array_checked_before_upload() {
        let Some(mut engine) = engine() else { return };
        let enc = EncodingConfig::new(5, 1);
        // Three empty rows: the offsets are the largest array.
        let cands = CandidateMatrix::from_row_starts(&[3], &[0, 0, 0, 0], &enc).unwrap();
        let spectra = SpectrumBatch::from_row_starts(&[3], &[0], &enc).unwrap();
        let conf = SearchConfig {
            encoding: enc,
            ..Default::default()
        }
        .with_gpu_method(GpuMethod::Spmv);
        engine.max_buffer_size = 8;
        match engine.search(&cands, &spectra, &conf) {
            Err(SearchError::DeviceFailure(msg)) => assert!(msg.contains("row offsets"), "{}", msg),
            other => panic!("expected a device failure, got {:?}", other),
        }
    }
}
