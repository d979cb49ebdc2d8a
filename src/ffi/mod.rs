// FFI 모듈 - 호스트 UI(C ABI) 연동

pub mod types;
pub mod exporter;

pub use exporter::*;
pub use types::ErrorCode;
