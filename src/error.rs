use std::fmt;
use std::path::PathBuf;

pub type FabResult<T> = Result<T, FabError>;

#[derive(Debug)]
pub enum FabError {
    Io {
        context: String,
        source: std::io::Error,
    },
    Fabfile {
        file: PathBuf,
        line: usize,
        message: String,
    },
}

impl FabError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FabError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn fabfile(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        FabError::Fabfile {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for FabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FabError::Io { context, source } => write!(f, "{context}: {source}"),
            FabError::Fabfile {
                file,
                line,
                message,
            } => write!(f, "{}:{}: {}", file.display(), line, message),
        }
    }
}

impl std::error::Error for FabError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FabError::Io { source, .. } => Some(source),
            FabError::Fabfile { .. } => None,
        }
    }
}
