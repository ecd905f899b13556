use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::thread;

use crate::errors::{LandCoverError, Result};

pub const DEFAULT_MODEL_PATH: &str =
    "trained_landcover_unet_efficientnet-b0_epochs18_patch512_batch16.onnx";

pub const DEFAULT_IMAGE_SIZE: u32 = 512;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
    pub model_path: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = default_num_threads())]
    pub num_threads: usize,

    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE, value_parser = check_image_size)]
    pub image_size: u32,

    /// JSON file replacing the built-in label/color tables
    #[arg(long)]
    pub class_table: Option<PathBuf>,

    /// Write per-request debug PNGs into this directory
    #[arg(long)]
    pub debug_dir: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Checks that can only run once the arguments are combined.
    pub fn validate(&self) -> Result<()> {
        if !self.model_path.is_file() {
            return Err(LandCoverError::configuration(format!(
                "model file not found: {}",
                self.model_path.display()
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(LandCoverError::configuration(
                "upload limit must be positive",
            ));
        }
        if let Some(path) = &self.class_table {
            if !path.is_file() {
                return Err(LandCoverError::configuration(format!(
                    "class table not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

fn default_num_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn check_image_size(s: &str) -> std::result::Result<u32, String> {
    let size: u32 = s
        .parse()
        .map_err(|_| format!("`{s}` is not a valid image size"))?;
    // UNet encoders downsample five times
    if size == 0 || size % 32 != 0 {
        return Err(format!("{size} is not supported. Use a positive multiple of 32"));
    }
    Ok(size)
}
