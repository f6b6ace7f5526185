// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for offline depth processing
//!
//! This module provides command-line functionality for:
//! - Reconstructing and visualizing depth images
//! - Aligning depth into the destination camera and compositing
//! - Plane and checkerboard calibration of the extrinsic transform

use depth_composite::camera::{CameraIntrinsicData, ExtrinsicTransform};
use depth_composite::config::Config;
use depth_composite::constants::VisualizationMode;
use depth_composite::frame::{ColorImage, DepthImage};
use depth_composite::pipelines::alignment::{AlignedDepth, DepthAlignmentParams, align_depth};
use depth_composite::pipelines::calibration::{
    CalibrationTarget, PrecomputedCorners, ProgressiveCalibrator, fit_plane, spawn_and_deproject,
};
use depth_composite::pipelines::composition::{
    RelightingLight, RelightingParams, add_crosshair, map_texture, normals_from_depth, relight,
};
use depth_composite::pipelines::depth_processing::{reconstruct, visualize_depth};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Load the config from `path`, or the user config when none is given
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Persist to `path` when given, otherwise to the user config
fn save_config(config: &Config, path: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            config.save_to(path)?;
            Ok(path.to_path_buf())
        }
        None => Ok(config.save()?),
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn source_intrinsics(config: &Config, depth: &DepthImage) -> Result<CameraIntrinsicData, Box<dyn std::error::Error>> {
    Ok(config
        .source_camera
        .intrinsics(depth.width(), depth.height())?)
}

fn print_transform(label: &str, transform: &ExtrinsicTransform) {
    let (roll, pitch, yaw) = transform.rotation.euler_angles();
    println!("{}:", label);
    println!(
        "  Rotation (deg): roll {:.3}, pitch {:.3}, yaw {:.3}",
        roll.to_degrees(),
        pitch.to_degrees(),
        yaw.to_degrees()
    );
    println!(
        "  Translation: ({:.3}, {:.3}, {:.3})",
        transform.translation.x, transform.translation.y, transform.translation.z
    );
}

/// Run the reconstruction filter over a 16-bit depth PNG
pub fn process_depth(
    input: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    steps: Option<u32>,
    use_gpu: bool,
) -> CliResult {
    let config = load_config(config_path.as_deref())?;
    let scale = config.depth_processing.input_scale;

    let raw = DepthImage::load(&input, scale)?;
    println!("Input: {} ({}x{})", input.display(), raw.width(), raw.height());

    let mut params = config
        .depth_processing
        .to_params(source_intrinsics(&config, &raw)?);
    if let Some(steps) = steps {
        params.enable_jacobi = steps > 0;
        params.num_jacobi_steps = steps;
    }

    let start = Instant::now();
    let processed = run_reconstruction(&raw, &params, use_gpu)?;
    println!("Processing time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
    println!(
        "Valid samples: {} -> {}",
        raw.valid_count(),
        processed.valid_count()
    );

    ensure_parent_dir(&output)?;
    processed.save(&output, scale)?;
    println!("Saved to: {}", output.display());
    Ok(())
}

#[cfg(feature = "gpu")]
fn run_reconstruction(
    raw: &DepthImage,
    params: &depth_composite::pipelines::depth_processing::DepthProcessingParams,
    use_gpu: bool,
) -> Result<DepthImage, Box<dyn std::error::Error>> {
    if !use_gpu {
        return Ok(reconstruct(raw, params)?);
    }
    let result = pollster::block_on(depth_composite::shaders::reconstruct_gpu(raw, params));
    match result {
        Err(depth_composite::errors::AppError::Gpu(e)) => {
            println!("GPU unavailable ({}), using CPU", e);
            Ok(reconstruct(raw, params)?)
        }
        other => Ok(other?),
    }
}

#[cfg(not(feature = "gpu"))]
fn run_reconstruction(
    raw: &DepthImage,
    params: &depth_composite::pipelines::depth_processing::DepthProcessingParams,
    use_gpu: bool,
) -> Result<DepthImage, Box<dyn std::error::Error>> {
    if use_gpu {
        println!("Built without GPU support, using CPU");
    }
    Ok(reconstruct(raw, params)?)
}

#[cfg(feature = "gpu")]
fn run_alignment(
    source: &DepthImage,
    width: u32,
    height: u32,
    params: &DepthAlignmentParams,
    use_gpu: bool,
) -> Result<AlignedDepth, Box<dyn std::error::Error>> {
    if !use_gpu {
        return Ok(align_depth(source, width, height, params)?);
    }
    Ok(pollster::block_on(depth_composite::shaders::align_depth_prefer_gpu(
        source, width, height, params,
    ))?)
}

#[cfg(not(feature = "gpu"))]
fn run_alignment(
    source: &DepthImage,
    width: u32,
    height: u32,
    params: &DepthAlignmentParams,
    use_gpu: bool,
) -> Result<AlignedDepth, Box<dyn std::error::Error>> {
    if use_gpu {
        println!("Built without GPU support, using CPU");
    }
    Ok(align_depth(source, width, height, params)?)
}

/// Options shared by the commands that produce a destination-space image
pub struct AlignOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub use_gpu: bool,
    pub config_path: Option<PathBuf>,
}

/// Reconstruct, then reproject into the destination camera.
///
/// Returns the destination intrinsics with the alignment result.
fn reconstruct_and_align(
    input: &Path,
    options: &AlignOptions,
    config: &Config,
) -> Result<(CameraIntrinsicData, AlignedDepth), Box<dyn std::error::Error>> {
    let scale = config.depth_processing.input_scale;
    let raw = DepthImage::load(input, scale)?;
    let source_camera = source_intrinsics(config, &raw)?;
    let processed = run_reconstruction(
        &raw,
        &config.depth_processing.to_params(source_camera),
        options.use_gpu,
    )?;

    let width = options.width.unwrap_or(raw.width());
    let height = options.height.unwrap_or(raw.height());
    let target_camera = config.destination_camera.intrinsics(width, height)?;
    let params = config.alignment.to_params(source_camera, target_camera);

    let start = Instant::now();
    let aligned = run_alignment(&processed, width, height, &params, options.use_gpu)?;
    println!(
        "Aligned {}x{} -> {}x{} (patch {}x{}) in {:.2}ms",
        raw.width(),
        raw.height(),
        width,
        height,
        aligned.patch.x,
        aligned.patch.y,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok((target_camera, aligned))
}

/// Align a depth PNG into the destination camera
pub fn align(input: PathBuf, output: PathBuf, uv_map: Option<PathBuf>, options: AlignOptions) -> CliResult {
    let config = load_config(options.config_path.as_deref())?;
    let options = AlignOptions {
        use_gpu: options.use_gpu || config.alignment.use_gpu,
        ..options
    };
    let (_, aligned) = reconstruct_and_align(&input, &options, &config)?;
    println!("Covered cells: {}", aligned.depth.valid_count());

    ensure_parent_dir(&output)?;
    aligned.depth.save(&output, config.depth_processing.input_scale)?;
    println!("Saved to: {}", output.display());

    if let Some(path) = uv_map {
        ensure_parent_dir(&path)?;
        aligned.uv_map.to_rgba8().save(&path)?;
        println!("UV map saved to: {}", path.display());
    }
    Ok(())
}

/// Texture map the source color image through aligned depth, with optional
/// relighting and crosshair overlay
pub fn compose(
    depth_input: PathBuf,
    color_input: PathBuf,
    output: PathBuf,
    light_direction: Option<[f32; 3]>,
    light_weight: f32,
    crosshair: bool,
    options: AlignOptions,
) -> CliResult {
    let config = load_config(options.config_path.as_deref())?;
    let options = AlignOptions {
        use_gpu: options.use_gpu || config.alignment.use_gpu,
        ..options
    };
    let (target_camera, aligned) = reconstruct_and_align(&depth_input, &options, &config)?;

    let source_color = ColorImage::load(&color_input)?;
    let mut composed = map_texture(&source_color, &aligned.source_uv)?;

    if let Some(direction) = light_direction {
        let normals = normals_from_depth(&aligned.depth, &target_camera);
        let params = RelightingParams {
            light: RelightingLight::Directional { direction },
            light_color: [1.0, 1.0, 1.0],
            light_weight,
            camera_transform: ExtrinsicTransform::identity(),
        };
        composed = relight(&composed, &aligned.depth, &normals, &target_camera, &params)?;
        println!("Relit with light direction {:?}", direction);
    }

    if crosshair || config.composition.show_crosshair {
        add_crosshair(&mut composed, &config.composition.crosshair);
    }

    ensure_parent_dir(&output)?;
    composed.save(&output)?;
    println!("Saved to: {}", output.display());
    Ok(())
}

/// Render a depth PNG for inspection
pub fn visualize(
    input: PathBuf,
    output: PathBuf,
    min: Option<f32>,
    max: Option<f32>,
    grayscale: bool,
    quantize: bool,
    config_path: Option<PathBuf>,
) -> CliResult {
    let config = load_config(config_path.as_deref())?;
    let settings = &config.depth_processing;
    let depth = DepthImage::load(&input, settings.input_scale)?;

    let range = [
        min.unwrap_or(settings.visualize_range[0]),
        max.unwrap_or(settings.visualize_range[1]),
    ];
    if !(range[1] > range[0]) {
        return Err(format!("Invalid range [{}, {}]", range[0], range[1]).into());
    }
    let mode = if grayscale {
        VisualizationMode::Grayscale
    } else {
        settings.visualization_mode
    };

    let rgba = visualize_depth(&depth, range, mode, quantize);
    ensure_parent_dir(&output)?;
    rgba.save(&output)?;
    println!(
        "{} visualization [{}, {}] saved to: {}",
        mode.display_name(),
        range[0],
        range[1],
        output.display()
    );
    Ok(())
}

/// Plane calibration: sample the board, fit a plane, solve the transform
pub fn fit_plane_command(input: PathBuf, save: bool, config_path: Option<PathBuf>) -> CliResult {
    let mut config = load_config(config_path.as_deref())?;
    let raw = DepthImage::load(&input, config.depth_processing.input_scale)?;
    let source_camera = source_intrinsics(&config, &raw)?;
    let processed = reconstruct(&raw, &config.depth_processing.to_params(source_camera))?;

    let (ruler_min, ruler_max) = config.calibration.spawn_rulers();
    let points = spawn_and_deproject(
        &processed,
        &source_camera,
        config.calibration.calibration_point_count,
        ruler_min,
        ruler_max,
    )?;
    println!(
        "Deprojected {} of {} points",
        points.len(),
        config.calibration.calibration_point_count
    );

    let plane = fit_plane(&points).ok_or("Points do not span a plane")?;
    println!(
        "Plane: origin ({:.2}, {:.2}, {:.2}), normal ({:.4}, {:.4}, {:.4})",
        plane.origin.x, plane.origin.y, plane.origin.z, plane.normal.x, plane.normal.y, plane.normal.z
    );

    let transform = config.calibration.plane_alignment().solve(&plane)?;
    print_transform("Source to destination", &transform);

    if save {
        config.store_calibration(transform);
        let path = save_config(&config, config_path.as_deref())?;
        println!("Saved to: {}", path.display());
    }
    Ok(())
}

/// Inputs of a checkerboard calibration run
pub struct CalibrateArgs {
    pub source_image: PathBuf,
    pub dest_image: PathBuf,
    pub source_corners: Vec<PathBuf>,
    pub dest_corners: Vec<PathBuf>,
    pub save: bool,
    pub config_path: Option<PathBuf>,
}

/// Checkerboard calibration from precomputed corner files, one pair per capture
pub fn calibrate(args: CalibrateArgs) -> CliResult {
    if args.source_corners.len() != args.dest_corners.len() {
        return Err(format!(
            "Got {} source and {} destination corner files",
            args.source_corners.len(),
            args.dest_corners.len()
        )
        .into());
    }
    if args.source_corners.is_empty() {
        return Err("No corner files given".into());
    }

    let mut config = load_config(args.config_path.as_deref())?;
    let source_image = load_gray(&args.source_image)?;
    let dest_image = load_gray(&args.dest_image)?;
    let source_camera = config
        .source_camera
        .intrinsics(source_image.width(), source_image.height())?;
    let dest_camera = config
        .destination_camera
        .intrinsics(dest_image.width(), dest_image.height())?;

    let mut corners = PrecomputedCorners::new();
    let mut captures = Vec::new();
    for (i, (source_path, dest_path)) in args.source_corners.iter().zip(&args.dest_corners).enumerate() {
        let source_key = format!("source-{}", i);
        let dest_key = format!("destination-{}", i);
        corners.load_target(source_key.as_str(), source_path)?;
        corners.load_target(dest_key.as_str(), dest_path)?;
        captures.push((
            CalibrationTarget::new(source_key, Some(source_image.clone()), Some(source_camera)),
            CalibrationTarget::new(dest_key, Some(dest_image.clone()), Some(dest_camera)),
        ));
    }

    let dimensions = config.calibration.checkerboard_dimensions;
    let square_size = config.calibration.checkerboard_size;
    println!("Checkerboard Calibration");
    println!("========================");
    println!(
        "Board: {}x{} corners, {} units per square",
        dimensions[0], dimensions[1], square_size
    );
    println!("Captures: {}", captures.len());
    println!();

    let mut calibrator = ProgressiveCalibrator::new().with_detector(Box::new(corners));
    for (i, (source, destination)) in captures.iter().enumerate() {
        match calibrator.run_calibration(source, destination, dimensions, square_size) {
            Ok(_) => println!(
                "  [{}] accepted: error {:.4} / {:.4}, average {:.4} / {:.4}",
                i,
                calibrator.current_source_error(),
                calibrator.current_destination_error(),
                calibrator.avg_source_error(),
                calibrator.avg_destination_error()
            ),
            Err(e) => println!("  [{}] rejected: {} ({})", i, e, e.code()),
        }
    }
    println!();

    if calibrator.num_samples() == 0 {
        return Err("No capture was accepted".into());
    }
    let transform = calibrator.calibrated_transform();
    println!("Samples: {}", calibrator.num_samples());
    print_transform("Source to destination", &transform);

    if args.save {
        config.store_calibration(transform);
        let path = save_config(&config, args.config_path.as_deref())?;
        println!("Saved to: {}", path.display());
    }
    Ok(())
}

fn load_gray(path: &Path) -> Result<GrayImage, Box<dyn std::error::Error>> {
    Ok(image::open(path)?.to_luma8())
}

/// Print or reset the configuration
pub fn show_config(reset: bool, config_path: Option<PathBuf>) -> CliResult {
    if reset {
        let path = save_config(&Config::default(), config_path.as_deref())?;
        println!("Reset configuration at: {}", path.display());
        return Ok(());
    }

    let config = match config_path.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let location = config_path.or_else(Config::default_path);
    if let Some(path) = location {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {}", e);
    }
    Ok(())
}
