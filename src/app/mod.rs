pub mod fetch_use_case;
pub mod load_use_case;
pub mod ports;
pub mod status_use_case;

pub use fetch_use_case::{FetchReport, FetchUseCase};
pub use load_use_case::LoadUseCase;
pub use status_use_case::{FileState, FileStatus, StatusUseCase};
