#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid container id: {0}")]
    InvalidContainerID(String),
    #[error("invalid pid: {0}")]
    InvalidPid(u32),
    #[error("invalid pid `{0}`")]
    InvalidPidString(String),
}
pub type Result<T> = std::result::Result<T, Error>;
