//! Applications driving a [`netsim_core::host`]: a plain file transfer and
//! a video streaming encoder/decoder coupling frame loss to SSIM through a
//! precomputed lookup table.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod file_transfer;
pub mod lookup;
pub mod rate_allocator;

pub use decoder::{Decoder, DecoderFrameRecord};
pub use encoder::{Encoder, EncoderFrameRecord};
pub use error::{AppError, AppResult};
pub use file_transfer::{FileReceiver, FileSender};
pub use lookup::LookupTable;
pub use rate_allocator::RateAllocator;
