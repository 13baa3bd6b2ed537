use cvsearch::SearchError;

#[derive(Debug)]
pub enum CliError {
    Config { source: String },
    ParseError { msg: String },
    Io { source: String, path: Option<String> },
    Search { source: SearchError },
    Mismatch { method: String, detail: String },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing input: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error accessing file {}: {}", path, source)
                } else {
                    write!(f, "Error accessing file: {}", source)
                }
            }
            CliError::Search { source } => write!(f, "Search failed: {}", source),
            CliError::Mismatch { method, detail } => {
                write!(f, "{} disagrees with the reference: {}", method, detail)
            }
        }
    }
}

impl From<SearchError> for CliError {
    fn from(e: SearchError) -> Self {
        CliError::Search { source: e }
    }
}

impl CliError {
    pub fn io(e: std::io::Error, path: &std::path::Path) -> Self {
        CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        }
    }
}
