use super::ValidationError;

/// The outcome of a validation that keeps every failure instead of stopping
/// at the first one.
#[derive(Debug, PartialEq, Clone)]
pub struct Valid<A, E>(Result<A, ValidationError<E>>);

pub trait Validator<A, E>: Sized {
    fn map<A1>(self, f: impl FnOnce(A) -> A1) -> Valid<A1, E>;
    fn and_then<B>(self, f: impl FnOnce(A) -> Valid<B, E>) -> Valid<B, E>;
    fn zip<A1>(self, other: Valid<A1, E>) -> Valid<(A, A1), E>;
    fn map_err<E1>(self, f: impl Fn(E) -> E1) -> Valid<A, E1>;
    fn trace(self, message: &str) -> Valid<A, E>;
    fn to_result(self) -> Result<A, ValidationError<E>>;
    fn is_succeed(&self) -> bool;

    fn unit(self) -> Valid<(), E> {
        self.map(|_| ())
    }

    fn is_fail(&self) -> bool {
        !self.is_succeed()
    }
}

impl<A, E> Valid<A, E> {
    pub fn succeed(a: A) -> Self {
        Valid(Ok(a))
    }

    pub fn fail(e: E) -> Self {
        Valid(Err(ValidationError::new(e)))
    }

    pub fn fail_with(error: ValidationError<E>) -> Self {
        Valid(Err(error))
    }

    pub fn from_option(option: Option<A>, e: E) -> Self {
        match option {
            Some(a) => Valid::succeed(a),
            None => Valid::fail(e),
        }
    }

    /// Runs `f` on every item and collects the successes, or every failure
    /// produced along the way.
    pub fn from_iter<B>(
        iter: impl IntoIterator<Item = A>,
        mut f: impl FnMut(A) -> Valid<B, E>,
    ) -> Valid<Vec<B>, E> {
        let mut values = Vec::new();
        let mut errors = ValidationError::empty();
        for a in iter {
            match f(a).0 {
                Ok(b) => values.push(b),
                Err(err) => errors = errors.combine(err),
            }
        }

        if errors.is_empty() {
            Valid::succeed(values)
        } else {
            Valid::fail_with(errors)
        }
    }
}

impl<A, E> Validator<A, E> for Valid<A, E> {
    fn map<A1>(self, f: impl FnOnce(A) -> A1) -> Valid<A1, E> {
        Valid(self.0.map(f))
    }

    fn and_then<B>(self, f: impl FnOnce(A) -> Valid<B, E>) -> Valid<B, E> {
        match self.0 {
            Ok(a) => f(a),
            Err(e) => Valid(Err(e)),
        }
    }

    fn zip<A1>(self, other: Valid<A1, E>) -> Valid<(A, A1), E> {
        match (self.0, other.0) {
            (Ok(a), Ok(a1)) => Valid::succeed((a, a1)),
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => Valid::fail_with(e),
            (Err(e1), Err(e2)) => Valid::fail_with(e1.combine(e2)),
        }
    }

    fn map_err<E1>(self, f: impl Fn(E) -> E1) -> Valid<A, E1> {
        Valid(self.0.map_err(|e| e.transform(&f)))
    }

    fn trace(self, message: &str) -> Valid<A, E> {
        Valid(self.0.map_err(|e| e.trace(message)))
    }

    fn to_result(self) -> Result<A, ValidationError<E>> {
        self.0
    }

    fn is_succeed(&self) -> bool {
        self.0.is_ok()
    }
}
