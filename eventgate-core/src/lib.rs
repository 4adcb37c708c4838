pub mod classifier;
pub mod error;
pub mod protocol;

pub use classifier::{Classifier, ClassifierConfig, ProcessClassifier, DEFAULT_CLASSIFIER_TIMEOUT};
pub use error::ClassifierError;
pub use protocol::{parse_verdict, Diagnostic};
