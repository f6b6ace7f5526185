// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depth-composite")]
#[command(about = "Depth camera compositing: reconstruction, alignment and calibration")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file to use instead of the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconstruction filter over a 16-bit depth PNG
    Process {
        input: PathBuf,
        output: PathBuf,

        /// Relaxation steps (0 disables relaxation), overrides the config
        #[arg(short, long)]
        steps: Option<u32>,

        /// Run relaxation on the GPU
        #[arg(long)]
        gpu: bool,
    },

    /// Reproject depth into the destination camera
    Align {
        input: PathBuf,
        output: PathBuf,

        /// Destination width (default: input width)
        #[arg(long)]
        width: Option<u32>,

        /// Destination height (default: input height)
        #[arg(long)]
        height: Option<u32>,

        /// Run the passes on the GPU, falling back to CPU
        #[arg(long)]
        gpu: bool,

        /// Also write the destination-to-source UV map as RGBA
        #[arg(long)]
        uv_map: Option<PathBuf>,
    },

    /// Texture map a source color image into the destination camera
    Compose {
        /// Source depth PNG
        depth: PathBuf,
        /// Source color image
        color: PathBuf,
        output: PathBuf,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        #[arg(long)]
        gpu: bool,

        /// Relight with a directional light travelling along x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3)]
        light: Option<Vec<f32>>,

        /// Relighting strength
        #[arg(long, default_value = "1.0")]
        light_weight: f32,

        /// Draw the alignment crosshair
        #[arg(long)]
        crosshair: bool,
    },

    /// Sample a flat board, fit a plane and solve the extrinsic transform
    FitPlane {
        input: PathBuf,

        /// Store the transform in the config
        #[arg(long)]
        save: bool,
    },

    /// Progressive checkerboard calibration from precomputed corners
    Calibrate {
        /// Source camera image of the board
        #[arg(long)]
        source_image: PathBuf,

        /// Destination camera image of the board
        #[arg(long)]
        dest_image: PathBuf,

        /// JSON list of [x, y] source corners, once per capture
        #[arg(long, required = true)]
        source_corners: Vec<PathBuf>,

        /// JSON list of [x, y] destination corners, once per capture
        #[arg(long, required = true)]
        dest_corners: Vec<PathBuf>,

        /// Store the transform in the config
        #[arg(long)]
        save: bool,
    },

    /// Render depth with a colormap
    Visualize {
        input: PathBuf,
        output: PathBuf,

        /// Near end of the range (default from config)
        #[arg(long)]
        min: Option<f32>,

        /// Far end of the range (default from config)
        #[arg(long)]
        max: Option<f32>,

        #[arg(long)]
        grayscale: bool,

        /// Quantize to bands
        #[arg(long)]
        quantize: bool,
    },

    /// Print the configuration
    Config {
        /// Overwrite with defaults
        #[arg(long)]
        reset: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=depth_composite=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command {
        Commands::Process {
            input,
            output,
            steps,
            gpu,
        } => cli::process_depth(input, output, config, steps, gpu),
        Commands::Align {
            input,
            output,
            width,
            height,
            gpu,
            uv_map,
        } => cli::align(
            input,
            output,
            uv_map,
            cli::AlignOptions {
                width,
                height,
                use_gpu: gpu,
                config_path: config,
            },
        ),
        Commands::Compose {
            depth,
            color,
            output,
            width,
            height,
            gpu,
            light,
            light_weight,
            crosshair,
        } => {
            let light = light.and_then(|v| <[f32; 3]>::try_from(v).ok());
            cli::compose(
                depth,
                color,
                output,
                light,
                light_weight,
                crosshair,
                cli::AlignOptions {
                    width,
                    height,
                    use_gpu: gpu,
                    config_path: config,
                },
            )
        }
        Commands::FitPlane { input, save } => cli::fit_plane_command(input, save, config),
        Commands::Calibrate {
            source_image,
            dest_image,
            source_corners,
            dest_corners,
            save,
        } => cli::calibrate(cli::CalibrateArgs {
            source_image,
            dest_image,
            source_corners,
            dest_corners,
            save,
            config_path: config,
        }),
        Commands::Visualize {
            input,
            output,
            min,
            max,
            grayscale,
            quantize,
        } => cli::visualize(input, output, min, max, grayscale, quantize, config),
        Commands::Config { reset } => cli::show_config(reset, config),
    }
}
