use thiserror::Error;

/// Why [`try_dynamic_pointer_cast`](crate::cast::try_dynamic_pointer_cast) gave no handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("cannot cast an empty SharedPtr")]
    Empty,
    #[error("pointee is not a {target}")]
    TypeMismatch { target: &'static str },
}
