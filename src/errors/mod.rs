mod check_error;

pub use check_error::{CheckError, CheckErrorKind};
