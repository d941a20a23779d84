//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{CliMaskSelection, ModelArgs};
#[cfg(feature = "server")]
use crate::{cli::main_impl::ServeArgs, config::ServerConfig};
use crate::{
    config::{CutoutConfig, ExecutionProvider, MaskSelection, SamModelSpec},
    processor::BackendType,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the cutout configuration and pick the backend
    pub(crate) fn from_model_args(args: &ModelArgs, verbose: u8) -> Result<(CutoutConfig, BackendType)> {
        let execution_provider: ExecutionProvider = args
            .execution_provider
            .parse()
            .context("Invalid execution provider")?;

        let mask_selection = match args.mask_selection {
            CliMaskSelection::First => MaskSelection::First,
            CliMaskSelection::HighestScore => MaskSelection::HighestScore,
        };

        let config = CutoutConfig::builder()
            .model(SamModelSpec {
                encoder_path: args.encoder.clone(),
                decoder_path: args.decoder.clone(),
            })
            .execution_provider(execution_provider)
            .num_threads(args.threads)
            .closing_kernel_size(args.closing_kernel)
            .blur_kernel_size(args.blur_kernel)
            .mask_selection(mask_selection)
            .multimask_output(args.multimask)
            .debug(verbose >= 2)
            .build()
            .context("Invalid configuration")?;

        let backend_type = if args.mock {
            BackendType::Mock
        } else {
            BackendType::Onnx
        };

        Ok((config, backend_type))
    }

    /// Build the HTTP service configuration
    #[cfg(feature = "server")]
    pub(crate) fn server_config(args: &ServeArgs) -> ServerConfig {
        ServerConfig {
            host: args.host.clone(),
            port: args.port,
            upload_dir: args.upload_dir.clone(),
            allowed_origins: args.allowed_origins.clone(),
            max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}
