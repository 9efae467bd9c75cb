mod extractor;
mod vgg;
mod weights;

pub use extractor::*;
pub use vgg::*;
pub use weights::*;
