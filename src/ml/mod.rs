pub mod ml_model;
pub mod preprocess;
pub mod inference;
pub mod decoder;
pub mod loader;

pub use ml_model::{ModelConfig, OutputActivation, RpsClassifier, NUM_CLASSES, IMAGE_SIZE, NUM_CHANNELS, INPUT_SHAPE, CLASS_NAMES};
pub use preprocess::{ImagePreprocessor, InputTensor, RawImage, ResizeFilter};
pub use inference::{BurnModel, InferenceEngine, ModelHandle, ScoreModel, ScoreVector};
pub use decoder::decode;
pub use loader::{export_model_bundle, load_burn_model, ModelLoader, ModelSource};
