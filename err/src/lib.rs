//! Error taxonomy shared by every crate in the esfat workspace.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no such file or directory")]
    NotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("is a directory")]
    IsDirectory,
    #[error("volume not mounted or corrupt")]
    InvalidState,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no free cluster available")]
    OutOfSpace,
    #[error("cluster chain corruption")]
    Corruption,
}

pub type Result<T> = core::result::Result<T, Error>;
