// SPDX-License-Identifier: GPL-3.0-only

//! CPU passes for depth compositing
//!
//! Passes run once per frame on immutable camera snapshots and hand their
//! output to the next stage. On a configuration or missing-input error a
//! pass logs a warning and its `*_or_passthrough` wrapper returns the input
//! unchanged, so one bad stage never blanks the composite.
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌───────────────────┐
//! │  Raw Depth   │ ──▶ │  Reconstruction   │ ──▶ │     Alignment     │
//! │ (source cam) │     │  - Preprocess     │     │  - UV map         │
//! │              │     │  - Jacobi steps   │     │  - Patch scatter  │
//! │              │     │  - Clipping       │     │  - Resolve        │
//! └──────────────┘     └───────────────────┘     └───────────────────┘
//!                                                          │
//!                                                          ▼
//!                                                ┌───────────────────┐
//!                                                │    Composition    │
//!                                                │  - Fog / relight  │
//!                                                │  - Texture map    │
//!                                                └───────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`depth_processing`]: Reconstruction filter and depth visualization
//! - [`alignment`]: Source-to-destination depth projection
//! - [`calibration`]: Plane-target and checkerboard extrinsic calibration
//! - [`composition`]: Consumers of the aligned depth

pub mod alignment;
pub mod calibration;
pub mod composition;
pub mod depth_processing;
