use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing arguments / profile values.
    Usage,
    /// The environment is not what the operation needs (no boot partition, read-only file, ...).
    Precondition,
    /// Anything else that failed along the way.
    Failed,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Precondition => 1,
            ErrorKind::Usage => 2,
            ErrorKind::Failed => 3,
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Failed,
            msg: msg.into(),
        }
    }

    pub fn usage<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Usage,
            msg: msg.into(),
        }
    }

    pub fn precondition<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Precondition,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::usage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
