pub mod convert;
pub mod frame;

pub use convert::yuv420_to_base64_jpeg;
pub use frame::{RawFrame, Yuv420Layout};
