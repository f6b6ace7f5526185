// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for reconstruction followed by alignment

use depth_composite::camera::{CameraIntrinsicData, CameraType, ExtrinsicTransform};
use depth_composite::frame::DepthImage;
use depth_composite::pipelines::alignment::{
    DepthAlignmentParams, UvMapCache, align_depth, align_depth_or_passthrough,
    align_depth_with_uv_map,
};
use depth_composite::pipelines::depth_processing::{DepthProcessingParams, reconstruct};

fn kinect() -> CameraIntrinsicData {
    CameraIntrinsicData::kinect(64, 48).unwrap()
}

fn wide_virtual() -> CameraIntrinsicData {
    CameraIntrinsicData::perspective(80f32.to_radians(), 64.0 / 48.0, 10.0, CameraType::Virtual)
        .unwrap()
}

/// Flat wall at 150 with diagonal dropout lines
fn holey_wall() -> DepthImage {
    DepthImage::from_fn(64, 48, |x, y| if (x + y) % 11 == 0 { 0.0 } else { 150.0 })
}

#[test]
fn test_reconstructed_wall_aligns_into_wider_camera() {
    let mut params = DepthProcessingParams::new(kinect());
    params.enable_jacobi = true;
    params.num_jacobi_steps = 3;
    let processed = reconstruct(&holey_wall(), &params).unwrap();
    assert_eq!(processed.valid_count(), 64 * 48, "Dropouts should be filled");

    let align_params =
        DepthAlignmentParams::new(kinect(), wide_virtual(), ExtrinsicTransform::identity());
    let aligned = align_depth(&processed, 64, 48, &align_params).unwrap();

    assert!((aligned.depth.get(32, 24) - 150.0).abs() < 1e-2);
    // The wider camera sees past the sensor frustum
    assert_eq!(aligned.depth.get(0, 0), 0.0);
    assert!(!aligned.uv_map.is_mapped(0, 0));
    assert!(aligned.uv_map.is_mapped(32, 24));
    assert!(aligned.depth.valid_count() < 64 * 48);
}

#[test]
fn test_cached_uv_map_matches_fresh_alignment() {
    let source = DepthImage::from_fn(64, 48, |x, y| 120.0 + x as f32 * 0.5 + y as f32);
    let params = DepthAlignmentParams::new(kinect(), wide_virtual(), ExtrinsicTransform::identity())
        .with_hole_filling_bias(1);

    let mut cache = UvMapCache::new();
    let uv_map = cache.get_or_compute(80, 60, &params).clone();
    assert!(cache.is_valid_for(80, 60, &params));
    assert!(!cache.is_valid_for(64, 48, &params));

    let cached = align_depth_with_uv_map(&source, uv_map, &params).unwrap();
    let fresh = align_depth(&source, 80, 60, &params).unwrap();
    assert_eq!(cached.depth, fresh.depth);
    assert_eq!(cached.patch, fresh.patch);
}

#[test]
fn test_virtual_source_passes_input_through() {
    let source = holey_wall();
    let params =
        DepthAlignmentParams::new(wide_virtual(), kinect(), ExtrinsicTransform::identity());
    assert!(align_depth(&source, 64, 48, &params).is_err());

    let out = align_depth_or_passthrough(&source, 64, 48, &params);
    assert_eq!(out, source);
}
