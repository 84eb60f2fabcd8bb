// SPDX-License-Identifier: MPL-2.0

pub mod context;
pub mod engine;
pub mod provider;
pub mod raster;
pub mod registry;
pub mod transform;
pub mod watch;

pub use context::Context;
pub use engine::{BackdropEngine, BackdropState, BackgroundHandle, EngineConfig};
pub use provider::{ImageProvider, Loader, Provider, ProviderId};
pub use raster::RasterImage;
pub use registry::ProviderRegistry;
