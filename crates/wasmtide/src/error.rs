use std::{cell::RefCell, fmt};

/// A byte range into the input that produced an entity, token, or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub offset: usize,
    pub len: usize,
}

impl Location {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// The location covering `start..end`.
    pub fn span(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Self {
            offset: start,
            len: end - start,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.offset, self.end())
    }
}

/// The error reporting capability shared by the decoder, the lexer, and the
/// validator.
///
/// Errors are non-fatal: an operation that fails reports here and returns its
/// empty success value, and the enclosing iterator terminates. Context frames
/// let a low-level failure surface with the chain of parses that led to it.
pub trait ErrorSink {
    fn on_error(&self, loc: Location, message: String);
    fn push_context(&self, loc: Location, desc: &'static str);
    fn pop_context(&self);
}

/// A single diagnostic collected by [`Errors`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub loc: Location,
    pub message: String,
    /// Outermost context first.
    pub context: Vec<(Location, &'static str)>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, desc) in &self.context {
            write!(f, "{desc} > ")?;
        }
        write!(f, "{} (at {})", self.message, self.loc)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Default)]
struct Collected {
    errors: Vec<Error>,
    context: Vec<(Location, &'static str)>,
}

/// The default [`ErrorSink`]: collects every reported diagnostic along with
/// the context chain that was active when it was reported.
///
/// The pipeline is single-threaded, so interior mutability is a `RefCell` and
/// one `Errors` may be shared by any number of live iterators.
#[derive(Debug, Default)]
pub struct Errors {
    inner: RefCell<Collected>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().errors.len()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.inner.into_inner().errors
    }

    /// Clone out the diagnostics collected so far.
    pub fn errors(&self) -> Vec<Error> {
        self.inner.borrow().errors.clone()
    }
}

impl ErrorSink for Errors {
    fn on_error(&self, loc: Location, message: String) {
        let mut inner = self.inner.borrow_mut();
        let context = inner.context.clone();
        inner.errors.push(Error {
            loc,
            message,
            context,
        });
    }

    fn push_context(&self, loc: Location, desc: &'static str) {
        self.inner.borrow_mut().context.push((loc, desc));
    }

    fn pop_context(&self) {
        self.inner.borrow_mut().context.pop();
    }
}

/// Scope guard for a context frame: pushes on construction, pops on drop, on
/// every return path.
pub struct ContextGuard<'a> {
    sink: &'a dyn ErrorSink,
}

impl<'a> ContextGuard<'a> {
    pub fn new(sink: &'a dyn ErrorSink, loc: Location, desc: &'static str) -> Self {
        sink.push_context(loc, desc);
        Self { sink }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.sink.pop_context();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_chain_is_captured() {
        let errors = Errors::new();
        {
            let _outer = ContextGuard::new(&errors, Location::new(0, 4), "memarg");
            let _inner = ContextGuard::new(&errors, Location::new(1, 2), "align");
            errors.on_error(Location::new(2, 1), "bad varint".to_string());
        }
        errors.on_error(Location::new(8, 1), "later".to_string());

        let collected = errors.into_errors();
        assert_eq!(collected.len(), 2);
        assert_eq!(
            collected[0].to_string(),
            "memarg > align > bad varint (at 0x2..0x3)"
        );
        assert!(collected[1].context.is_empty());
    }
}
