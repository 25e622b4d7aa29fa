//! The result model shared by every jtr crate, and the decoders that turn a test runner's
//! streamed output into it.

pub mod decode;
pub mod model;

pub use decode::{DecodeError, Decoder, DecoderOptions, Dialect};
pub use model::{
    expected_identities, ProgressEvent, ProgressSender, ResultDetail, ResultStatus, TestIdentity,
    TestItem, TestKind, TestLevel, TestResult,
};
