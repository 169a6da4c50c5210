mod registry;

pub use registry::{ModelRegistry, ModelSpec, CAPABILITY_IMAGE_CONFIG};
