use std::fmt::{Debug, Display};

use super::Cause;

/// A non-empty collection of validation failures.
#[derive(Debug, PartialEq, Default, Clone)]
pub struct ValidationError<E>(Vec<Cause<E>>);

impl<E: Display> Display for ValidationError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Validation Error\n")?;
        for cause in self.as_vec() {
            write!(f, "\u{2022} {}", cause.message)?;
            if !cause.trace.is_empty() {
                write!(f, " [{}]", cause.trace.join(", "))?;
            }
            f.write_str("\n")?;
        }

        Ok(())
    }
}

impl<E> ValidationError<E> {
    pub fn new(e: E) -> Self {
        ValidationError(vec![Cause::new(e)])
    }

    pub fn empty() -> Self {
        ValidationError(Vec::new())
    }

    pub fn as_vec(&self) -> &Vec<Cause<E>> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn combine(mut self, mut other: ValidationError<E>) -> ValidationError<E> {
        self.0.append(&mut other.0);
        self
    }

    /// Prefixes every cause with `message`, so the outermost context reads first.
    pub fn trace(self, message: &str) -> Self {
        let mut causes = self.0;
        for cause in causes.iter_mut() {
            cause.trace.insert(0, message.to_owned());
        }
        Self(causes)
    }

    pub fn transform<E1>(self, f: &impl Fn(E) -> E1) -> ValidationError<E1> {
        ValidationError(self.0.into_iter().map(|cause| cause.transform(f)).collect())
    }
}

impl<E: Display + Debug> std::error::Error for ValidationError<E> {}

impl<E> From<Vec<Cause<E>>> for ValidationError<E> {
    fn from(value: Vec<Cause<E>>) -> Self {
        ValidationError(value)
    }
}
