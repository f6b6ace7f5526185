// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the passes consuming aligned depth

use depth_composite::camera::{CameraIntrinsicData, ExtrinsicTransform};
use depth_composite::frame::{ColorImage, DepthImage};
use depth_composite::pipelines::alignment::{DepthAlignmentParams, align_depth};
use depth_composite::pipelines::composition::{
    Crosshair, FogSettings, FogVolume, RelightingLight, RelightingParams, VolumetricFogData,
    add_crosshair, composite_volumetric_fog, fog_grid_size, map_texture, normals_from_depth,
    relight,
};

fn camera() -> CameraIntrinsicData {
    CameraIntrinsicData::kinect(64, 48).unwrap()
}

fn aligned_wall() -> (DepthImage, depth_composite::frame::UvMap) {
    let source = DepthImage::filled(64, 48, 180.0);
    let params = DepthAlignmentParams::new(camera(), camera(), ExtrinsicTransform::identity());
    let aligned = align_depth(&source, 64, 48, &params).unwrap();
    (aligned.depth, aligned.source_uv)
}

#[test]
fn test_texture_follows_identity_alignment() {
    let source_color = ColorImage::from_fn(64, 48, |x, y| [x as f32 / 63.0, y as f32 / 47.0, 0.5, 1.0]);
    let (_, source_uv) = aligned_wall();

    let mapped = map_texture(&source_color, &source_uv).unwrap();
    for (a, b) in mapped.data().iter().zip(source_color.data()) {
        for c in 0..4 {
            assert!((a[c] - b[c]).abs() < 1e-4, "{:?} vs {:?}", a, b);
        }
    }
}

#[test]
fn test_relight_then_fog_then_crosshair() {
    let (depth, _) = aligned_wall();
    let base = ColorImage::filled(64, 48, [0.5, 0.5, 0.5, 1.0]);

    // Light travels along the view axis onto a wall facing the camera
    let normals = normals_from_depth(&depth, &camera());
    let params = RelightingParams {
        light: RelightingLight::Directional {
            direction: [0.0, 0.0, 1.0],
        },
        light_color: [1.0, 1.0, 1.0],
        light_weight: 0.5,
        camera_transform: ExtrinsicTransform::identity(),
    };
    let lit = relight(&base, &depth, &normals, &camera(), &params).unwrap();
    assert!((lit.get(20, 20)[0] - 0.75).abs() < 1e-3);

    let (grid, _) = fog_grid_size(64, 48);
    let fog = VolumetricFogData::new(
        64,
        48,
        &FogSettings::default(),
        FogVolume::filled(grid, [0.1, 0.1, 0.1, 0.8]),
    )
    .unwrap();
    let mut fogged = composite_volumetric_fog(&lit, &depth, &fog).unwrap();
    assert!((fogged.get(20, 20)[0] - (0.75 * 0.8 + 0.1)).abs() < 1e-3);

    let crosshair = Crosshair {
        color: [0.0, 1.0, 0.0, 1.0],
        width: 2,
        length: 10,
    };
    add_crosshair(&mut fogged, &crosshair);
    let centre = fogged.get(32, 24);
    assert!(centre[0].abs() < 1e-5 && (centre[1] - 1.0).abs() < 1e-5);
    assert!((fogged.get(2, 2)[1] - 0.7).abs() < 1e-3);
}
