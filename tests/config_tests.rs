// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use depth_composite::Config;
use depth_composite::camera::{CameraType, ExtrinsicTransform};
use depth_composite::config::{CameraModel, CameraSettings};
use nalgebra::{UnitQuaternion, Vector3};
use std::path::PathBuf;

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("depth-composite-tests-{}", std::process::id()))
        .join(name)
}

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = Config::default();

    assert!(config.validate().is_ok(), "Default config should validate");
    assert_eq!(config.source_camera.camera_type, CameraType::Physical);
    assert_eq!(
        config.alignment.source_to_destination,
        ExtrinsicTransform::identity(),
        "Uncalibrated config should use the identity transform"
    );
}

#[test]
fn test_config_save_and_load() {
    let path = scratch_file("nested/dir/config.json");
    let mut config = Config::default();
    config.depth_processing.enable_jacobi = true;
    config.depth_processing.num_jacobi_steps = 24;
    config.alignment.hole_filling_bias = 2;
    config.store_calibration(ExtrinsicTransform::new(
        UnitQuaternion::from_euler_angles(0.02, -0.1, 0.3),
        Vector3::new(4.0, -1.5, 12.0),
    ));

    config.save_to(&path).unwrap();
    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(loaded.calibration.calibrated_at.is_some());

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_stored_calibration_reloads_bit_exact() {
    let path = scratch_file("calibration/config.json");
    for (i, angles) in [(0.02, -0.1, 0.3), (1.1, 0.7, -2.9), (1e-9, 3.0e-5, 0.123456789)]
        .into_iter()
        .enumerate()
    {
        let transform = ExtrinsicTransform::new(
            UnitQuaternion::from_euler_angles(angles.0, angles.1, angles.2),
            Vector3::new(1.0 / 3.0, -7.0 * i as f64 / 11.0, 0.1 + 0.2),
        );
        let mut config = Config::default();
        config.store_calibration(transform);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap().alignment.source_to_destination;
        let bits = |t: &ExtrinsicTransform| {
            let q = t.rotation.quaternion().coords;
            [q.x, q.y, q.z, q.w, t.translation.x, t.translation.y, t.translation.z].map(f64::to_bits)
        };
        assert_eq!(bits(&loaded), bits(&transform), "rotation {:?}", angles);
    }
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_config_load_rejects_garbage() {
    let path = scratch_file("garbage.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();
    assert!(Config::load_from(&path).is_err());
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_camera_settings_json_shape() {
    let settings = CameraSettings {
        camera_type: CameraType::Virtual,
        model: CameraModel::Perspective {
            horizontal_fov_deg: 75.0,
            aspect_ratio: Some(1.5),
            near_plane: 5.0,
        },
    };
    let json = serde_json::to_value(settings).unwrap();
    assert_eq!(json["model"], "perspective");
    assert_eq!(json["camera_type"], "Virtual");

    let parsed: CameraSettings = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, settings);
    let cam = parsed.intrinsics(300, 200).unwrap();
    assert!((cam.horizontal_fov.to_degrees() - 75.0).abs() < 1e-3);
}
