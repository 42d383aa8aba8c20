use std::any::Any;
use std::error::Error;
use std::fmt;

use crate::parallel::batch::SubRange;

/// Failure of a parallel loop, reported once every sub-range has finished.
///
/// When several sub-ranges fail, the one with the lowest indices is returned
/// and `suppressed` counts the others.
#[derive(Debug)]
pub enum ParallelError<E> {
    /// The body returned `Err` for `range`.
    Body {
        range: SubRange,
        source: E,
        suppressed: usize,
    },
    /// The body panicked while running `range`.
    Panicked {
        range: SubRange,
        message: String,
        suppressed: usize,
    },
    /// Worker threads could not be spawned.
    PoolBuild(rayon::ThreadPoolBuildError),
}

impl<E> ParallelError<E> {
    /// Sub-range the reported failure came from, if any.
    pub fn range(&self) -> Option<SubRange> {
        match self {
            Self::Body { range, .. } | Self::Panicked { range, .. } => Some(*range),
            Self::PoolBuild(_) => None,
        }
    }

    /// Number of further failed sub-ranges not carried by this error.
    pub fn suppressed(&self) -> usize {
        match self {
            Self::Body { suppressed, .. } | Self::Panicked { suppressed, .. } => *suppressed,
            Self::PoolBuild(_) => 0,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ParallelError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body {
                range,
                source,
                suppressed,
            } => {
                write!(f, "loop body failed on [{}, {}): {source}", range.start, range.end)?;
                if *suppressed > 0 {
                    write!(f, " ({suppressed} more sub-ranges failed)")?;
                }
                Ok(())
            }
            Self::Panicked {
                range,
                message,
                suppressed,
            } => {
                write!(f, "loop body panicked on [{}, {}): {message}", range.start, range.end)?;
                if *suppressed > 0 {
                    write!(f, " ({suppressed} more sub-ranges failed)")?;
                }
                Ok(())
            }
            Self::PoolBuild(err) => write!(f, "failed to start worker pool: {err}"),
        }
    }
}

impl<E> Error for ParallelError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Body { source, .. } => Some(source),
            Self::Panicked { .. } => None,
            Self::PoolBuild(err) => Some(err),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
