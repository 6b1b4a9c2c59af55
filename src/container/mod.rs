use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Number of characters shown by [`ContainerID::short`].
const SHORT_ID_LEN: usize = 12;

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use creo_metrics::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.short(), "abc123abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the abbreviated id used in log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process id of a container's init process, as seen from the monitoring host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(u32);

impl Pid {
    pub fn new(pid: u32) -> Result<Self> {
        if pid == 0 {
            return Err(Error::InvalidPid(pid));
        }
        Ok(Self(pid))
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl std::str::FromStr for Pid {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::InvalidPidString(s.to_owned()))?;
        Pid::new(raw)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_rejects_empty_and_long() {
        assert!(ContainerID::new("").is_err());
        assert!(ContainerID::new("a".repeat(256)).is_err());
        assert!(ContainerID::new("a".repeat(255)).is_ok());
    }

    #[test]
    fn test_short_id() {
        let id = ContainerID::new("0123456789abcdef").unwrap();
        assert_eq!(id.short(), "0123456789ab");

        let id = ContainerID::new("abc").unwrap();
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_pid_parse() {
        assert_eq!("42".parse::<Pid>().unwrap().as_raw(), 42);
        assert!(matches!("0".parse::<Pid>(), Err(Error::InvalidPid(0))));
        assert!(matches!(
            "abc".parse::<Pid>(),
            Err(Error::InvalidPidString(_))
        ));
    }
}
