pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::{ArchitectureSettings, ModelMetadata, WeightShard, MAX_CONV_CHANNELS, MAX_HIDDEN_UNITS, MODEL_FORMAT, MODEL_FORMAT_VERSION};
pub use model_storage::{save_model_bundle, load_metadata, load_model_bundle, print_metadata_info, DEFAULT_SHARD_SIZE};
pub use config::{AppConfig, DeviceType, LogSettings, ModelSettings, PreprocessSettings};
