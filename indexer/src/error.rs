use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use etl::error::EtlError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Captured backtrace wrapper, so variants without one of their own can still report it.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the indexer service.
#[derive(Debug)]
pub enum IndexerError {
    /// Failure raised by the indexing pipeline or one of its collaborators.
    Etl(EtlError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl IndexerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            IndexerError::Etl(_) => "indexing error",
            IndexerError::Config(_, _) => "configuration error",
            IndexerError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            IndexerError::Etl(err) => Some(err.backtrace()),
            IndexerError::Config(_, backtrace) => Some(&backtrace.0),
            IndexerError::Io(_, backtrace) => Some(&backtrace.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        IndexerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report of the error and its causes for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("indexer failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace() {
            if let Some(backtrace) = self.backtrace() {
                out.push_str("backtrace:\n");
                out.push_str(&backtrace.to_string());
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        out
    }
}

impl fmt::Display for IndexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexerError::Etl(err) => write!(f, "{err}"),
            IndexerError::Config(source, _) => write!(f, "configuration error: {source}"),
            IndexerError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for IndexerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IndexerError::Etl(err) => err.source(),
            IndexerError::Config(source, _) => Some(source.as_ref()),
            IndexerError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for IndexerError {
    fn from(err: std::io::Error) -> Self {
        IndexerError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for IndexerError {
    fn from(err: EtlError) -> Self {
        IndexerError::Etl(err)
    }
}
